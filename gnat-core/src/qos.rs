use crate::err::{DecodeError, DecodeErrorKind};

#[derive(PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Debug, Hash)]
pub enum QosLevel {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QosLevel {
    /// Grant for a SUBSCRIBE request byte: the requested level when it is a
    /// valid QoS, otherwise at-most-once.
    pub fn granted_for(requested: u8) -> Self {
        return Self::try_from(requested).unwrap_or(Self::AtMostOnce);
    }
}

impl TryFrom<u8> for QosLevel {
    type Error = DecodeError;

    /// Takes a byte with non-QoS bits masked out and the QoS bits shifted
    /// down to the two least significant positions.
    fn try_from(value: u8) -> Result<Self, DecodeError> {
        let out = match value {
            0 => Self::AtMostOnce,
            1 => Self::AtLeastOnce,
            2 => Self::ExactlyOnce,
            _ => {
                return Err(DecodeError::new(
                    DecodeErrorKind::BadQos,
                    format!("Invalid QoS: {value}, only values 0-2 are valid"),
                ));
            }
        };

        return Ok(out);
    }
}
