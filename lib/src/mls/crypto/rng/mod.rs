//! Randomness for signing keys, HPKE encapsulation, fresh path secrets, group ids and
//! reuse guards. Everything is drawn from the operating system.

use rand_core::{CryptoRng, OsRng, RngCore};

use super::Secret;


#[inline]
pub(crate) fn rng() -> impl RngCore + CryptoRng {
    OsRng
}

#[inline]
pub(crate) fn random_array<const N: usize>() -> [u8; N] {
    let mut array = [0u8; N];
    rng().fill_bytes(&mut array);
    array
}

/// `len` fresh bytes, wrapped so they are wiped on drop.
pub(crate) fn random_secret(len: usize) -> Secret {
    let mut bytes = vec![0u8; len];
    rng().fill_bytes(&mut bytes);
    Secret::new(bytes)
}
