use std::fmt;

use serde::{Deserialize, Serialize};

/// 分配给单个工作者的闭区间 `[start, end]`
///
/// 当总量小于工作者数量时，区间可能为空（`end == start - 1`），
/// 因此使用有符号整数。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct KeyRange {
    pub start: i64,
    pub end: i64,
}

impl KeyRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// 区间内的键数量，空区间为0
    pub fn len(&self) -> u64 {
        if self.end < self.start {
            0
        } else {
            (self.end - self.start + 1) as u64
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn contains(&self, key: i64) -> bool {
        self.start <= key && key <= self.end
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// 数据填充区间：`n=<count> -pop seq=<start>..<end>`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PopulationRange {
    pub range: KeyRange,
}

impl PopulationRange {
    pub fn count(&self) -> u64 {
        self.range.len()
    }

    /// 压测工具的填充参数片段，前后各带一个空格便于拼接
    pub fn to_args(&self) -> String {
        format!(" n={} -pop seq={} ", self.count(), self.range)
    }
}
