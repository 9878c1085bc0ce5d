//! Major type 7 handlers: simple values and floats.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::{CborError, CborValue, OtherValue};

/// Builds a major-type-7 value from its additional info and argument.
///
/// For floats the argument carries the raw IEEE 754 bits; for the one-byte
/// simple value extension (additional info 24) it carries the simple value.
pub trait OtherHandler: Send + Sync {
    fn create(&self, additional_info: u8, argument: u64) -> Result<CborValue, CborError>;
}

impl<F> OtherHandler for F
where
    F: Fn(u8, u64) -> Result<CborValue, CborError> + Send + Sync,
{
    fn create(&self, additional_info: u8, argument: u64) -> Result<CborValue, CborError> {
        self(additional_info, argument)
    }
}

struct Constant(OtherValue);

impl OtherHandler for Constant {
    fn create(&self, _: u8, _: u64) -> Result<CborValue, CborError> {
        Ok(CborValue::Other(self.0))
    }
}

struct SimpleValue;

impl OtherHandler for SimpleValue {
    fn create(&self, additional_info: u8, argument: u64) -> Result<CborValue, CborError> {
        if additional_info < 24 {
            return Ok(CborValue::Other(OtherValue::Simple(additional_info)));
        }
        // Values below 32 must use the one-byte form.
        match u8::try_from(argument) {
            Ok(v) if v >= 32 => Ok(CborValue::Other(OtherValue::Simple(v))),
            _ => Err(CborError::UnsupportedOther(format!(
                "simple value {argument} in extended form"
            ))),
        }
    }
}

struct Float;

impl OtherHandler for Float {
    fn create(&self, additional_info: u8, argument: u64) -> Result<CborValue, CborError> {
        let value = match additional_info {
            25 => half_to_f64(argument as u16),
            26 => f32::from_bits(argument as u32) as f64,
            27 => f64::from_bits(argument),
            other => {
                return Err(CborError::UnsupportedOther(format!(
                    "float with additional info {other}"
                )))
            }
        };
        Ok(CborValue::Other(OtherValue::Float(value)))
    }
}

/// IEEE 754 binary16 to f64.
pub fn half_to_f64(bits: u16) -> f64 {
    let exponent = (bits >> 10) & 0x1f;
    let mantissa = (bits & 0x3ff) as f64;
    let magnitude = match exponent {
        0 => mantissa * 2f64.powi(-24),
        31 if mantissa == 0.0 => f64::INFINITY,
        31 => f64::NAN,
        e => (mantissa + 1024.0) * 2f64.powi(e as i32 - 25),
    };
    if bits & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

#[derive(Clone, Default)]
pub struct OtherRegistry {
    handlers: HashMap<u8, Arc<dyn OtherHandler>>,
}

impl OtherRegistry {
    /// A registry that rejects every major-type-7 value except the break
    /// marker, which the decoder handles itself.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        for ai in 0..20u8 {
            registry.register(ai, SimpleValue);
        }
        registry.register(20, Constant(OtherValue::False));
        registry.register(21, Constant(OtherValue::True));
        registry.register(22, Constant(OtherValue::Null));
        registry.register(23, Constant(OtherValue::Undefined));
        registry.register(24, SimpleValue);
        registry.register(25, Float);
        registry.register(26, Float);
        registry.register(27, Float);
        registry
    }

    pub fn register(&mut self, additional_info: u8, handler: impl OtherHandler + 'static) {
        self.handlers.insert(additional_info, Arc::new(handler));
    }

    pub fn with(mut self, additional_info: u8, handler: impl OtherHandler + 'static) -> Self {
        self.register(additional_info, handler);
        self
    }

    pub fn create(&self, additional_info: u8, argument: u64) -> Result<CborValue, CborError> {
        let handler = self.handlers.get(&additional_info).ok_or_else(|| {
            CborError::UnsupportedOther(format!("additional info {additional_info}"))
        })?;
        handler.create(additional_info, argument)
    }
}

impl fmt::Debug for OtherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.handlers.keys().collect();
        keys.sort();
        f.debug_struct("OtherRegistry")
            .field("additional_info", &keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_precision() {
        assert_eq!(half_to_f64(0x3c00), 1.0);
        assert_eq!(half_to_f64(0xc000), -2.0);
        assert_eq!(half_to_f64(0x7bff), 65504.0);
        assert_eq!(half_to_f64(0x0001), 5.960464477539063e-8);
        assert_eq!(half_to_f64(0x7c00), f64::INFINITY);
        assert!(half_to_f64(0x7e00).is_nan());
        assert_eq!(half_to_f64(0x8000), -0.0);
    }

    #[test]
    fn test_defaults() {
        let registry = OtherRegistry::with_defaults();
        assert_eq!(
            registry.create(21, 21).unwrap(),
            CborValue::Other(OtherValue::True)
        );
        assert_eq!(
            registry.create(16, 16).unwrap(),
            CborValue::Other(OtherValue::Simple(16))
        );
        assert_eq!(
            registry.create(24, 255).unwrap(),
            CborValue::Other(OtherValue::Simple(255))
        );
        assert!(registry.create(24, 20).is_err());
        assert_eq!(
            registry.create(26, 0x3fc0_0000).unwrap(),
            CborValue::Other(OtherValue::Float(1.5))
        );
    }

    #[test]
    fn test_empty_registry_rejects() {
        let registry = OtherRegistry::empty();
        assert!(matches!(
            registry.create(22, 22),
            Err(CborError::UnsupportedOther(_))
        ));
    }
}
