use serde::{Serialize, Serializer};
use std::fmt;

use crate::ticket_engine::TicketError;

/// Number of distinct tickets in one cycle of a queue.
pub const TICKET_MODULUS: i64 = 10_000;

const TICKET_WIDTH: usize = 4;

/// A ticket number in `0..=9999`, rendered as four zero-padded digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TicketNumber(u16);

impl TicketNumber {
    /// Validating constructor. Values outside `0..=9999` are rejected.
    pub fn new(value: i64) -> Result<Self, TicketError> {
        if (0..TICKET_MODULUS).contains(&value) {
            Ok(TicketNumber(value as u16))
        } else {
            Err(TicketError::InvalidArgument(format!(
                "ticket number {} is outside 0..={}",
                value,
                TICKET_MODULUS - 1
            )))
        }
    }

    /// Normalizing constructor, folds any integer into the cycle.
    pub fn wrapping(value: i64) -> Self {
        TicketNumber(value.rem_euclid(TICKET_MODULUS) as u16)
    }

    pub fn value(&self) -> u16 {
        self.0
    }

    pub fn formatted(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = TICKET_WIDTH)
    }
}

impl Serialize for TicketNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl TryFrom<i64> for TicketNumber {
    type Error = TicketError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        TicketNumber::new(value)
    }
}

/// Renders any integer as a four digit ticket, wrapping modulo 10000.
pub fn format_number(n: i64) -> String {
    TicketNumber::wrapping(n).formatted()
}
