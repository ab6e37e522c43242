//! Fixed-size hash and secret newtypes.
//!
//! All three are 32 bytes and render as lowercase hex. They are kept as
//! distinct types so a secret can never be passed where a digest is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! bytes32 {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// First four bytes as hex, for log lines.
            #[must_use]
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }
    };
}

bytes32!(
    /// SHA-256 commitment digest or root hash.
    Digest
);

bytes32!(
    /// A participant's reveal secret.
    Secret
);

bytes32!(
    /// The finalized per-batch ordering seed.
    Seed
);

impl Secret {
    /// Fresh uniformly random secret for a client commitment.
    #[must_use]
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// XOR two secrets byte-wise.
    #[must_use]
    pub fn xor(&self, other: &Self) -> Self {
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = self.0[i] ^ other.0[i];
        }
        Self(out)
    }
}
