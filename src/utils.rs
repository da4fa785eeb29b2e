/// [Szudzik pairing function][szudzik-pairing], wrapping on overflow.
///
/// ```text
/// (a, b) -> if (a<b) then (b^2 + a) else (a^2 + a + b)
/// ```
///
/// [szudzik-pairing]: http://szudzik.com/ElegantPairing.pdf
pub fn pairing_szudzik(a: u64, b: u64) -> u64 {
    if a < b {
        b.wrapping_mul(b).wrapping_add(a)
    } else {
        a.wrapping_mul(a).wrapping_add(a).wrapping_add(b)
    }
}

/// [Pairing function][pairing] for two `u64` values.
///
/// [pairing]: https://en.wikipedia.org/wiki/Pairing_function
pub fn pairing2(a: u64, b: u64) -> u64 {
    pairing_szudzik(a, b)
}

/// Pairing function for three `u64` values.
pub fn pairing3(a: u64, b: u64, c: u64) -> u64 {
    pairing2(pairing2(a, b), c)
}

/// Fold a sequence of values into a single hash, seeded with `tag`.
pub fn pairing_seq(tag: u64, values: impl IntoIterator<Item = u64>) -> u64 {
    values.into_iter().fold(tag, pairing2)
}

pub trait MyHash {
    /// Hash used to pick a bucket in the unique table.
    ///
    /// Collisions are allowed: the table always compares full values.
    fn hash(&self) -> u64;
}
