/// Half-open byte interval `[start, end)` of a multipart transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    /// 1-based ordinal.
    pub number: u32,
    pub start: u64,
    pub end: u64,
}

impl Part {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// `Range` header value (inclusive end) for a non-empty part.
    pub fn range_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end.saturating_sub(1))
    }
}

/// Split `size` bytes into `ceil(size / part_size)` parts, at least one.
pub fn partition(size: u64, part_size: u64) -> Vec<Part> {
    let part_size = part_size.max(1);
    let count = size.div_ceil(part_size).max(1);
    (0..count)
        .map(|index| {
            let start = index * part_size;
            Part {
                number: (index + 1) as u32,
                start,
                end: (start + part_size).min(size),
            }
        })
        .collect()
}
