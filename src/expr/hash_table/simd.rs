//! Lane-wide gather used by the linear-probing table

/// Number of probe lanes processed together
pub const SIMD_WIDTH: usize = 8;

/// Load `table[indices[i]]` for every lane.
///
/// Uses `_mm256_i32gather_epi32` when the CPU supports AVX2, a scalar loop
/// otherwise.
///
/// # Panics
/// Panics if any index is negative or out of bounds.
pub fn gather_i32(table: &[i32], indices: &[i32; SIMD_WIDTH]) -> [i32; SIMD_WIDTH] {
    assert!(
        indices.iter().all(|&i| i >= 0 && (i as usize) < table.len()),
        "gather index out of bounds"
    );

    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: avx2 is available and every index was bounds checked above
            return unsafe { gather_i32_avx2(table, indices) };
        }
    }

    gather_i32_scalar(table, indices)
}

#[inline]
fn gather_i32_scalar(table: &[i32], indices: &[i32; SIMD_WIDTH]) -> [i32; SIMD_WIDTH] {
    let mut out = [0i32; SIMD_WIDTH];
    for (slot, &index) in out.iter_mut().zip(indices.iter()) {
        *slot = table[index as usize];
    }
    out
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
unsafe fn gather_i32_avx2(table: &[i32], indices: &[i32; SIMD_WIDTH]) -> [i32; SIMD_WIDTH] {
    use std::arch::x86_64::{
        __m256i, _mm256_i32gather_epi32, _mm256_loadu_si256, _mm256_storeu_si256,
    };

    let offsets = _mm256_loadu_si256(indices.as_ptr() as *const __m256i);
    let gathered = _mm256_i32gather_epi32::<4>(table.as_ptr(), offsets);
    let mut out = [0i32; SIMD_WIDTH];
    _mm256_storeu_si256(out.as_mut_ptr() as *mut __m256i, gathered);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_matches_scalar() {
        let table: Vec<i32> = (0..64).map(|i| i * 3 - 7).collect();
        let indices = [0, 63, 5, 5, 17, 32, 1, 40];
        let expected = gather_i32_scalar(&table, &indices);
        assert_eq!(gather_i32(&table, &indices), expected);
        assert_eq!(expected[1], 63 * 3 - 7);
    }

    #[test]
    #[should_panic(expected = "gather index out of bounds")]
    fn test_gather_out_of_bounds() {
        let table = vec![0i32; 4];
        gather_i32(&table, &[0, 1, 2, 3, 4, 0, 0, 0]);
    }
}
