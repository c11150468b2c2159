pub(crate) use self::packet_generators::*;

pub(crate) use self::packet_collectors::*;
