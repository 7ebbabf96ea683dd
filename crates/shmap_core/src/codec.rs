//! Key and value encoding.
//!
//! Keys and values cross the store as raw bytes. Strings and byte vectors
//! are stored as-is; integers use native byte order, matching how record
//! fields are accessed in place.

use crate::error::{StoreError, StoreResult};
use std::borrow::Cow;

/// Types that can be written into the store.
pub trait Encode {
    /// Returns the stored byte form.
    fn encode(&self) -> Cow<'_, [u8]>;
}

/// Types that can be read back from the store.
pub trait Decode: Sized {
    /// Rebuilds a value from its stored bytes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Decode`] if the bytes are not a valid encoding.
    fn decode(bytes: &[u8]) -> StoreResult<Self>;
}

impl Encode for str {
    fn encode(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}

impl Encode for String {
    fn encode(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self.as_bytes())
    }
}

impl Decode for String {
    fn decode(bytes: &[u8]) -> StoreResult<Self> {
        String::from_utf8(bytes.to_vec())
            .map_err(|e| StoreError::decode(format!("invalid UTF-8: {e}")))
    }
}

impl Encode for [u8] {
    fn encode(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self)
    }
}

impl Encode for Vec<u8> {
    fn encode(&self) -> Cow<'_, [u8]> {
        Cow::Borrowed(self)
    }
}

impl Decode for Vec<u8> {
    fn decode(bytes: &[u8]) -> StoreResult<Self> {
        Ok(bytes.to_vec())
    }
}

macro_rules! int_codec {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            fn encode(&self) -> Cow<'_, [u8]> {
                Cow::Owned(self.to_ne_bytes().to_vec())
            }
        }

        impl Decode for $ty {
            fn decode(bytes: &[u8]) -> StoreResult<Self> {
                let raw = bytes.try_into().map_err(|_| {
                    StoreError::decode(format!(
                        "expected {} bytes for {}, found {}",
                        std::mem::size_of::<$ty>(),
                        stringify!($ty),
                        bytes.len()
                    ))
                })?;
                Ok(<$ty>::from_ne_bytes(raw))
            }
        }
    )*};
}

int_codec!(i32, i64, u32, u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_stored_raw() {
        assert_eq!(&*"key1".encode(), b"key1");
        assert_eq!(String::decode(b"one").unwrap(), "one");
        assert!(matches!(
            String::decode(&[0xff, 0xfe]),
            Err(StoreError::Decode { .. })
        ));
    }

    #[test]
    fn integers_use_native_order() {
        assert_eq!(&*42i32.encode(), &42i32.to_ne_bytes());
        assert_eq!(i64::decode(&(-7i64).to_ne_bytes()).unwrap(), -7);
        assert!(u32::decode(&[1, 2, 3]).is_err());
    }

    #[test]
    fn bytes_pass_through() {
        let data = vec![0u8, 1, 2];
        assert!(matches!(data.encode(), Cow::Borrowed(_)));
        assert_eq!(Vec::<u8>::decode(&data).unwrap(), data);
    }
}
