use crate::ConfigError;
use std::net::Ipv4Addr;

mod arp_cache;
pub use self::arp_cache::*;

mod route_table;
pub use self::route_table::*;

/// Splits a table file into numbered, whitespace separated records, skipping blank lines.
/// Line numbers start at 1.
fn records(contents: &str) -> impl Iterator<Item = (usize, Vec<&str>)> {
    contents
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.split_whitespace().collect::<Vec<_>>()))
        .filter(|(_, fields)| !fields.is_empty())
}

fn expect_fields(line: usize, fields: &[&str], expected: usize) -> Result<(), ConfigError> {
    if fields.len() != expected {
        return Err(ConfigError::FieldCount {
            line,
            expected,
            found: fields.len(),
        });
    }
    Ok(())
}

fn parse_ipv4(line: usize, value: &str) -> Result<Ipv4Addr, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidIpv4 {
        line,
        value: value.to_owned(),
    })
}
