//! Module to handle the formatting of atomic amounts given the coin's decimal places.

use std::num::{ParseIntError, TryFromIntError};

#[derive(thiserror::Error, Debug)]
#[allow(missing_docs)]
pub enum Error {
    #[error("The maximum precision is 12, given {0}")]
    TooPrecise(u8),

    #[error("Negative amounts are not representable")]
    Negative,

    #[error(transparent)]
    Parse(#[from] ParseIntError),

    #[error("There was an overflow in converting the string {0}")]
    Overflow(String),

    #[error(transparent)]
    From(#[from] TryFromIntError),

    #[error("Our precision is {our}, given a string with {given}")]
    StringTooPrecise { our: u8, given: u8 },
}

/// Helper to convert atomic amounts to the display value with the given
/// number of decimal places and viceversa.
///
/// For example 100 atomic units with 2 decimal places is "1.00".
#[derive(Debug, Clone, Copy)]
pub struct Precision(u8);

impl Precision {
    /// Create a new Precision, erroring if the given precision is greater than the allowed maximum (12)
    pub fn new(precision: u8) -> Result<Precision, Error> {
        if precision > 12 {
            Err(Error::TooPrecise(precision))
        } else {
            Ok(Precision(precision))
        }
    }

    /// Convert the given `atomic` amount to the formatted value according to our precision
    ///
    /// ```
    /// # use cwk_common::precision::Precision;
    /// let p = Precision::new(2).unwrap();
    /// assert_eq!(p.atomic_to_string(100), "1.00");
    /// ```
    pub fn atomic_to_string(&self, atomic: u64) -> String {
        let precision = self.0 as usize;
        if precision == 0 {
            return atomic.to_string();
        }

        let atomic = atomic.to_string();
        if atomic.len() > precision {
            let over = atomic.len() - precision;
            format!("{}.{}", &atomic[..over], &atomic[over..])
        } else {
            let missing = precision - atomic.len();
            format!("0.{}{}", "0".repeat(missing), atomic)
        }
    }

    /// Convert the given display string to atomic units.
    ///
    /// Rejects negative values and values with more fractional digits than
    /// our precision (sub-atomic amounts).
    ///
    /// ```
    /// # use cwk_common::precision::Precision;
    /// let p = Precision::new(2).unwrap();
    /// assert_eq!(p.string_to_atomic("1.00").unwrap(), 100);
    /// assert_eq!(p.string_to_atomic("1.0").unwrap(), 100);
    /// assert_eq!(p.string_to_atomic("1").unwrap(), 100);
    /// ```
    pub fn string_to_atomic(&self, val: &str) -> Result<u64, Error> {
        if val.starts_with('-') {
            return Err(Error::Negative);
        }
        match val.find('.') {
            Some(idx) => {
                let right_idx: u8 = (val.len() - idx - 1).try_into()?;
                if right_idx > self.0 {
                    return Err(Error::StringTooPrecise {
                        our: self.0,
                        given: right_idx,
                    });
                }

                let without_dot = val.replacen('.', "", 1);

                // u128 since the scaled value may momentarily overflow u64
                // before the division brings it back in range
                let parsed_without_dot = self.inner_convert(&without_dot)?;
                let pow = 10u128.pow(right_idx as u32);
                Ok((parsed_without_dot / pow).try_into()?)
            }
            None => Ok(self.inner_convert(val)?.try_into()?),
        }
    }

    fn inner_convert(&self, val: &str) -> Result<u128, Error> {
        let num: u128 = val.parse()?;
        let pow = 10u128.pow(self.0 as u32);
        num.checked_mul(pow)
            .ok_or_else(|| Error::Overflow(val.to_string()))
    }
}
