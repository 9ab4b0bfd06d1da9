//! FP64 state fingerprints and the seen-set
//!
//! States are identified by a 64-bit polynomial (Rabin) fingerprint over
//! GF(2^64). The irreducible polynomial is configurable; the default is the
//! first entry of the classic FP64 polynomial table. Any `Hash` type can be
//! fingerprinted: its hash stream is fed byte by byte into the polynomial.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Default irreducible polynomial
pub const FP64_INIT: u64 = 0x911498AE0E66BAD6;

const ONE: u64 = 0x8000000000000000;
const X63: u64 = 0x1;

/// Number of lock stripes in the seen-set
const SHARDS: usize = 64;

/// A 64-bit state fingerprint
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub u64);

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FP({:016x})", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Fingerprinting scheme for one irreducible polynomial
pub struct Fp64 {
    poly: u64,
    table: Box<[u64; 256]>,
}

impl Fp64 {
    /// Build the byte table for `poly`
    pub fn new(poly: u64) -> Self {
        Self {
            poly,
            table: Box::new(byte_mod_table(poly)),
        }
    }

    /// The irreducible polynomial in use
    pub fn poly(&self) -> u64 {
        self.poly
    }

    /// Fingerprint any hashable value
    pub fn fingerprint<T: Hash + ?Sized>(&self, value: &T) -> Fingerprint {
        let mut hasher = Fp64Hasher {
            fp: self.poly,
            table: &self.table,
        };
        value.hash(&mut hasher);
        Fingerprint(hasher.finish())
    }
}

impl Default for Fp64 {
    fn default() -> Self {
        Self::new(FP64_INIT)
    }
}

impl fmt::Debug for Fp64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fp64").field("poly", &format_args!("{:#x}", self.poly)).finish()
    }
}

struct Fp64Hasher<'a> {
    fp: u64,
    table: &'a [u64; 256],
}

impl Hasher for Fp64Hasher<'_> {
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            let idx = ((b as u64) ^ self.fp) as usize & 0xFF;
            self.fp = (self.fp >> 8) ^ self.table[idx];
        }
    }

    fn finish(&self) -> u64 {
        self.fp
    }
}

/// Byte-at-a-time extension table for `poly`
fn byte_mod_table(poly: u64) -> [u64; 256] {
    // Highest power needed is x^(127 - 7*8)
    const PLENGTH: usize = 72;
    let mut powers = [0u64; PLENGTH];

    let mut t = ONE;
    for entry in powers.iter_mut() {
        *entry = t;
        let mask = if (t & X63) != 0 { poly } else { 0 };
        t = (t >> 1) ^ mask;
    }

    let mut table = [0u64; 256];
    for (j, entry) in table.iter_mut().enumerate() {
        let mut v = 0u64;
        for k in 0..=7 {
            if (j & (1usize << k)) != 0 {
                v ^= powers[127 - 7 * 8 - k];
            }
        }
        *entry = v;
    }
    table
}

/// Concurrent set of seen fingerprints
///
/// Lock-striped: each fingerprint maps to one of `SHARDS` mutex-guarded
/// sets, so workers inserting unrelated states rarely contend.
pub struct FingerprintSet {
    shards: Vec<Mutex<HashSet<u64>>>,
    len: AtomicU64,
}

impl FingerprintSet {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashSet::new())).collect(),
            len: AtomicU64::new(0),
        }
    }

    fn shard(&self, fp: Fingerprint) -> &Mutex<HashSet<u64>> {
        &self.shards[(fp.0 >> 58) as usize % SHARDS]
    }

    /// Insert a fingerprint, returning true if it was not present
    pub fn insert(&self, fp: Fingerprint) -> bool {
        let inserted = self.shard(fp).lock().insert(fp.0);
        if inserted {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
        inserted
    }

    pub fn contains(&self, fp: Fingerprint) -> bool {
        self.shard(fp).lock().contains(&fp.0)
    }

    pub fn len(&self) -> u64 {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All stored fingerprints, in no particular order
    pub fn snapshot(&self) -> Vec<u64> {
        let mut all = Vec::with_capacity(self.len() as usize);
        for shard in &self.shards {
            all.extend(shard.lock().iter().copied());
        }
        all
    }

    /// Smallest gap between any two stored fingerprints
    ///
    /// Returns `None` with fewer than two fingerprints.
    pub fn min_distance(&self) -> Option<u64> {
        let mut all = self.snapshot();
        all.sort_unstable();
        all.windows(2).map(|w| w[1] - w[0]).min()
    }
}

impl Default for FingerprintSet {
    fn default() -> Self {
        Self::new()
    }
}

impl FromIterator<u64> for FingerprintSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let set = Self::new();
        for fp in iter {
            set.insert(Fingerprint(fp));
        }
        set
    }
}
