//! Versioned save states for the YM2612

use crate::ym2612::Ym2612;
use bincode::config::{Fixint, LittleEndian};
use bincode::error::{DecodeError, EncodeError};
use thiserror::Error;

/// Version byte written at the start of every save state
pub const SAVE_STATE_VERSION: u8 = 1;

const BINCODE_CONFIG: bincode::config::Configuration<LittleEndian, Fixint> =
    bincode::config::standard().with_little_endian().with_fixed_int_encoding();

#[derive(Debug, Error)]
pub enum SaveStateError {
    #[error("unsupported save state version {found}; newest supported version is {supported}")]
    UnsupportedVersion { found: u8, supported: u8 },
    #[error("save state is truncated; expected at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("error saving state: {0}")]
    Encode(#[from] EncodeError),
    #[error("error loading state: {0}")]
    Decode(#[from] DecodeError),
}

impl Ym2612 {
    /// Serialize the full chip state, prefixed by [`SAVE_STATE_VERSION`].
    ///
    /// Buffered output samples are not included.
    ///
    /// # Errors
    ///
    /// Returns an error if bincode fails to encode the chip.
    pub fn save_state(&self) -> Result<Vec<u8>, SaveStateError> {
        let mut bytes = vec![SAVE_STATE_VERSION];
        bytes.extend(bincode::encode_to_vec(self, BINCODE_CONFIG)?);

        log::debug!(
            "Saved YM2612 state: {} bytes at native sample {}",
            bytes.len(),
            self.native_sample_count()
        );

        Ok(bytes)
    }

    /// Restore chip state produced by [`Ym2612::save_state`].
    ///
    /// Output settings (quantization, ladder effect, busy behavior), the clock and output
    /// frequencies, and any buffered samples are kept from the current chip. On error the chip is
    /// left unmodified.
    ///
    /// # Errors
    ///
    /// Returns an error if the version byte is newer than [`SAVE_STATE_VERSION`], if the buffer
    /// is too short, or if the payload is malformed.
    pub fn load_state(&mut self, bytes: &[u8]) -> Result<(), SaveStateError> {
        let loaded = decode_state(bytes).inspect_err(|err| {
            log::warn!("Rejected YM2612 save state: {err}");
        })?;

        self.replace_state(loaded);

        log::debug!("Loaded YM2612 state at native sample {}", self.native_sample_count());

        Ok(())
    }
}

fn decode_state(bytes: &[u8]) -> Result<Ym2612, SaveStateError> {
    let Some((&version, payload)) = bytes.split_first() else {
        return Err(SaveStateError::Truncated { expected: 1, actual: 0 });
    };

    if version > SAVE_STATE_VERSION {
        return Err(SaveStateError::UnsupportedVersion {
            found: version,
            supported: SAVE_STATE_VERSION,
        });
    }

    match bincode::decode_from_slice(payload, BINCODE_CONFIG) {
        Ok((ym2612, _)) => Ok(ym2612),
        Err(DecodeError::UnexpectedEnd { additional }) => Err(SaveStateError::Truncated {
            expected: bytes.len() + additional,
            actual: bytes.len(),
        }),
        Err(err) => Err(err.into()),
    }
}
