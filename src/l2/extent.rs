use std::fmt;

/// Recovery quality of a run of output bytes
///
/// Ordered from worst to best.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ExtentKind {
    /// Nothing was recovered; the bytes are zero
    Hole,
    /// Recovered from fewer shards than needed, or from disagreeing frames
    BestGuess,
    /// Reconstructed without redundancy left to check it
    Unverified,
    /// Checked by Reed-Solomon parity or by a SHA-1 digest
    Verified,
}
impl ExtentKind {
    pub const ALL: [ExtentKind; 4] = [
        ExtentKind::Verified,
        ExtentKind::Unverified,
        ExtentKind::BestGuess,
        ExtentKind::Hole,
    ];
}
impl fmt::Display for ExtentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hole => "hole",
            Self::BestGuess => "best-guess",
            Self::Unverified => "unverified",
            Self::Verified => "verified",
        };
        f.write_str(name)
    }
}

/// A contiguous run of output bytes of one [`ExtentKind`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extent {
    pub offset: u64,
    pub data: Vec<u8>,
    pub kind: ExtentKind,
}
impl Extent {
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Offset one past the last byte
    #[must_use]
    pub fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }
}

/// Cuts `data`, starting at `base`, into extents of equal consecutive kinds
///
/// `kinds` holds one entry per byte of `data`.
pub(crate) fn split(base: u64, data: &[u8], kinds: &[ExtentKind]) -> Vec<Extent> {
    let mut extents: Vec<Extent> = Vec::new();
    for (offset, (&byte, &kind)) in data.iter().zip(kinds).enumerate() {
        match extents.last_mut() {
            Some(last) if last.kind == kind => last.data.push(byte),
            _ => extents.push(Extent {
                offset: base + offset as u64,
                data: vec![byte],
                kind,
            }),
        }
    }
    extents
}

/// Merges abutting extents of equal kind
pub fn merge(extents: Vec<Extent>) -> Vec<Extent> {
    let mut merged: Vec<Extent> = Vec::with_capacity(extents.len());
    for extent in extents {
        match merged.last_mut() {
            Some(last) if last.kind == extent.kind && last.end() == extent.offset => {
                last.data.extend_from_slice(&extent.data);
            }
            _ => merged.push(extent),
        }
    }
    merged
}

/// Total byte count per kind, in [`ExtentKind::ALL`] order
#[must_use]
pub fn summarize(extents: &[Extent]) -> [(ExtentKind, usize); 4] {
    ExtentKind::ALL.map(|kind| {
        let bytes = extents
            .iter()
            .filter(|e| e.kind == kind)
            .map(Extent::len)
            .sum();
        (kind, bytes)
    })
}
