//! Fixed-point resampling weight tables.
//!
//! Every entry maps one destination column (or row) to at most two
//! contributing source units. Weights are 16.16 fixed point and the
//! populated slots of one entry always sum to [`FIXED_ONE`].

use alloc::format;
use alloc::vec;
use alloc::vec::Vec;

use crate::error::DecodeError;

/// Fixed-point 1.0.
pub const FIXED_ONE: i32 = 65536;

/// Round half away from zero, the way the blend weights expect.
#[inline]
pub(crate) fn round_i32(v: f64) -> i32 {
    v.round() as i32
}

/// Blend descriptor for one destination unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelWeight {
    /// First contributing source unit (inclusive).
    pub src_start: i32,
    /// Last contributing source unit (inclusive).
    pub src_end: i32,
    /// Weight of `src_start`, then of `src_end`.
    pub weights: [i32; 2],
}

impl PixelWeight {
    const fn single(src: i32) -> Self {
        Self {
            src_start: src,
            src_end: src,
            weights: [FIXED_ONE, 0],
        }
    }

    const fn pair(start: i32, end: i32, w0: i32) -> Self {
        Self {
            src_start: start,
            src_end: end,
            weights: [w0, FIXED_ONE - w0],
        }
    }

    /// Sum of the slots that actually contribute.
    pub fn weight_sum(&self) -> i32 {
        if self.src_start == self.src_end {
            self.weights[0]
        } else {
            self.weights[0] + self.weights[1]
        }
    }
}

/// Per-destination-unit weights along one axis.
#[derive(Clone, Debug, Default)]
pub struct WeightTable {
    entries: Vec<PixelWeight>,
}

impl WeightTable {
    /// Horizontal table mapping `src_len` source columns onto `dest_len`
    /// destination columns.
    ///
    /// Magnification places each source column on an anchor column
    /// `round(src * scale)` and blends the columns between two anchors
    /// (or repeats the left one when `interpolate` is false). Columns past
    /// the last anchor repeat the last source column. Minification picks
    /// the nearest source column.
    pub fn horizontal(dest_len: i32, src_len: i32, interpolate: bool) -> Result<Self, DecodeError> {
        let mut entries = Self::alloc(dest_len, src_len)?;
        let scale = f64::from(dest_len) / f64::from(src_len);
        if scale > 1.0 {
            let mut pre_des_col = 0;
            for src_col in 0..src_len {
                let des_col = round_i32(f64::from(src_col) * scale).min(dest_len - 1);
                entries[des_col as usize] = PixelWeight::single(src_col);
                let span = des_col - pre_des_col;
                for idx in pre_des_col + 1..des_col {
                    let w0 = if interpolate {
                        round_i32(f64::from(des_col - idx) / f64::from(span) * f64::from(FIXED_ONE))
                    } else {
                        FIXED_ONE
                    };
                    entries[idx as usize] = PixelWeight::pair(src_col - 1, src_col, w0);
                }
                if src_col == src_len - 1 {
                    for idx in des_col + 1..dest_len {
                        entries[idx as usize] = PixelWeight::single(src_col);
                    }
                }
                pre_des_col = des_col;
            }
        } else {
            for (des_col, entry) in entries.iter_mut().enumerate() {
                let src_col = round_i32(des_col as f64 / scale).clamp(0, src_len - 1);
                *entry = PixelWeight::single(src_col);
            }
        }
        Ok(Self { entries })
    }

    /// Vertical table for `dest_len` destination rows fed by `src_len`
    /// source rows.
    ///
    /// Unlike the horizontal table, indices stored here are destination
    /// rows: the vertical pass blends rows already written to the bitmap.
    /// Each source row lands on `floor(src * scale)`; rows in between
    /// blend the two bracketing anchors; once the next anchor would fall
    /// outside the destination, the remaining rows repeat the last anchor.
    pub fn vertical(dest_len: i32, src_len: i32) -> Result<Self, DecodeError> {
        let mut entries = Self::alloc(dest_len, src_len)?;
        let scale = f64::from(dest_len) / f64::from(src_len);
        if scale > 1.0 {
            let mut step = 0.0f64;
            let mut src_row = 0;
            while step < f64::from(dest_len) {
                let start = step as i32;
                src_row += 1;
                step = scale * f64::from(src_row);
                let end = step as i32;
                if end >= dest_len {
                    for row in start..dest_len {
                        entries[row as usize] = PixelWeight::single(start);
                    }
                    break;
                }
                entries[start as usize] = PixelWeight::single(start);
                let length = f64::from(end - start);
                for row in start + 1..end {
                    let w0 = round_i32(f64::from(end - row) / length * f64::from(FIXED_ONE));
                    entries[row as usize] = PixelWeight::pair(start, end, w0);
                }
            }
        } else {
            for (row, entry) in entries.iter_mut().enumerate() {
                *entry = PixelWeight::single(row as i32);
            }
        }
        Ok(Self { entries })
    }

    fn alloc(dest_len: i32, src_len: i32) -> Result<Vec<PixelWeight>, DecodeError> {
        if dest_len < 0 {
            return Err(DecodeError::InvalidParameter(format!(
                "negative destination length {dest_len}"
            )));
        }
        if src_len <= 0 {
            return Err(DecodeError::InvalidParameter(format!(
                "source length must be positive, got {src_len}"
            )));
        }
        let len = dest_len as usize;
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(len)
            .map_err(|_| DecodeError::AllocationFailed {
                requested: len * core::mem::size_of::<PixelWeight>(),
            })?;
        entries.resize(len, PixelWeight::single(0));
        Ok(entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Elements per entry in flat storage: start, end and two weights.
    pub fn item_size(&self) -> usize {
        4
    }

    pub fn get(&self, index: usize) -> Option<&PixelWeight> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> core::slice::Iter<'_, PixelWeight> {
        self.entries.iter()
    }
}

impl core::ops::Index<usize> for WeightTable {
    type Output = PixelWeight;

    fn index(&self, index: usize) -> &PixelWeight {
        &self.entries[index]
    }
}

/// General stretch table: area coverage for minification, bilinear
/// taps for magnification. Entries may reference more than two source
/// units and are kept in flat `[start, end, w...]` records.
#[derive(Clone, Debug)]
pub struct StretchTable {
    item_size: usize,
    data: Vec<i32>,
}

impl StretchTable {
    pub fn new(dest_len: i32, src_len: i32, interpolate: bool) -> Result<Self, DecodeError> {
        if dest_len <= 0 || src_len <= 0 {
            return Err(DecodeError::InvalidParameter(format!(
                "stretch lengths must be positive, got {dest_len} from {src_len}"
            )));
        }
        let scale = f64::from(src_len) / f64::from(dest_len);
        let item_size = 2 + scale.abs().ceil() as usize + 1;
        let total = (dest_len as usize)
            .checked_mul(item_size)
            .ok_or(DecodeError::AllocationFailed { requested: usize::MAX })?;
        let mut data = vec![0i32; total];
        let src_max = src_len;

        for dest in 0..dest_len {
            let rec = &mut data[dest as usize * item_size..(dest as usize + 1) * item_size];
            if scale < 1.0 {
                let src_pos = f64::from(dest) * scale + scale / 2.0;
                if interpolate {
                    let start = ((src_pos - 0.5).floor() as i32).max(0);
                    let end = ((src_pos + 0.5).floor() as i32).min(src_max - 1);
                    rec[0] = start;
                    rec[1] = end;
                    if start == end {
                        rec[2] = FIXED_ONE;
                    } else {
                        let w1 = round_i32((src_pos - f64::from(start) - 0.5) * f64::from(FIXED_ONE));
                        rec[3] = w1;
                        rec[2] = FIXED_ONE - w1;
                    }
                } else {
                    let src = (src_pos.floor() as i32).min(src_max - 1);
                    rec[0] = src;
                    rec[1] = src;
                    rec[2] = FIXED_ONE;
                }
                continue;
            }

            let src_start = f64::from(dest) * scale;
            let src_end = src_start + scale;
            let start = (src_start.floor() as i32).max(0);
            let mut end = (src_end.ceil() as i32).min(src_max - 1);
            if start > end {
                end = start;
            }
            // Coverage of source unit j over [dest, dest + 1) in destination space.
            let mut last = start;
            for j in start..=end {
                let area_start = (f64::from(j) / scale).max(f64::from(dest));
                let area_end = (f64::from(j + 1) / scale).min(f64::from(dest + 1));
                let weight = if area_start >= area_end { 0.0 } else { area_end - area_start };
                if (weight == 0.0 && j == end && j > start) || 2 + (j - start) as usize >= item_size {
                    break;
                }
                rec[2 + (j - start) as usize] = round_i32(weight * f64::from(FIXED_ONE));
                last = j;
            }
            rec[0] = start;
            rec[1] = last;
            let n = (last - start) as usize;
            let others: i32 = rec[2..2 + n].iter().sum();
            rec[2 + n] = FIXED_ONE - others;
        }
        Ok(Self { item_size, data })
    }

    pub fn item_size(&self) -> usize {
        self.item_size
    }

    pub fn len(&self) -> usize {
        self.data.len() / self.item_size
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// `(src_start, src_end, weights)` for one destination unit.
    pub fn entry(&self, dest: usize) -> (i32, i32, &[i32]) {
        let rec = &self.data[dest * self.item_size..(dest + 1) * self.item_size];
        let n = (rec[1] - rec[0]) as usize + 1;
        (rec[0], rec[1], &rec[2..2 + n])
    }
}
