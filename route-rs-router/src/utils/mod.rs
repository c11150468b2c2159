#[cfg(test)]
pub(crate) mod test;
