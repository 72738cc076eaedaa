use serde::{Deserialize, Deserializer, Serialize};

pub const MAX_FLOAT_DIGITS: u8 = 7;
pub const MAX_DOUBLE_DIGITS: u8 = 9;

const DEFAULT_FLOAT_DIGITS: u8 = 5;
const DEFAULT_DOUBLE_DIGITS: u8 = 9;

/// Number of decimal places used when numeric values are serialized into request payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precision {
    #[serde(default = "default_float", deserialize_with = "float_digits")]
    float_digits: u8,
    #[serde(default = "default_double", deserialize_with = "double_digits")]
    double_digits: u8,
}

impl Default for Precision {
    fn default() -> Self {
        Self {
            float_digits: DEFAULT_FLOAT_DIGITS,
            double_digits: DEFAULT_DOUBLE_DIGITS,
        }
    }
}

impl Precision {
    pub fn float_digits(&self) -> u8 {
        self.float_digits
    }

    pub fn double_digits(&self) -> u8 {
        self.double_digits
    }

    /// Values above [`MAX_FLOAT_DIGITS`] are ignored.
    pub fn set_float_digits(&mut self, digits: u8) {
        if digits <= MAX_FLOAT_DIGITS {
            self.float_digits = digits;
        }
    }

    /// Values above [`MAX_DOUBLE_DIGITS`] are ignored.
    pub fn set_double_digits(&mut self, digits: u8) {
        if digits <= MAX_DOUBLE_DIGITS {
            self.double_digits = digits;
        }
    }
}

fn default_float() -> u8 {
    DEFAULT_FLOAT_DIGITS
}

fn default_double() -> u8 {
    DEFAULT_DOUBLE_DIGITS
}

// Out of range values in a settings document fall back to the default, the same way the
// setters ignore them.
fn float_digits<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let digits = u8::deserialize(deserializer)?;
    Ok(if digits <= MAX_FLOAT_DIGITS {
        digits
    } else {
        DEFAULT_FLOAT_DIGITS
    })
}

fn double_digits<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let digits = u8::deserialize(deserializer)?;
    Ok(if digits <= MAX_DOUBLE_DIGITS {
        digits
    } else {
        DEFAULT_DOUBLE_DIGITS
    })
}
