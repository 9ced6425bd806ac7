// src/simulation/permanent.rs — Matrix permanent (Ryser, Gray-code order)

use nalgebra::{Complex, DMatrix};

pub type C64 = Complex<f64>;

/// Permanent of a square complex matrix in O(2^n · n).
///
/// The empty matrix has permanent 1.
pub fn permanent(m: &DMatrix<C64>) -> C64 {
    let n = m.nrows();
    debug_assert_eq!(n, m.ncols());
    if n == 0 {
        return C64::new(1.0, 0.0);
    }
    if n == 1 {
        return m[(0, 0)];
    }

    let zero = C64::new(0.0, 0.0);
    let mut row_sums = vec![zero; n];
    let mut total = zero;
    let mut prev_gray: u64 = 0;

    for k in 1u64..(1u64 << n) {
        let gray = k ^ (k >> 1);
        let flipped = (gray ^ prev_gray).trailing_zeros() as usize;
        let adding = gray & (1 << flipped) != 0;
        for (i, sum) in row_sums.iter_mut().enumerate() {
            if adding {
                *sum += m[(i, flipped)];
            } else {
                *sum -= m[(i, flipped)];
            }
        }
        prev_gray = gray;

        let prod = row_sums.iter().fold(C64::new(1.0, 0.0), |acc, s| acc * *s);
        // (-1)^(n - |S|)
        if (n as u32 - gray.count_ones()) % 2 == 0 {
            total += prod;
        } else {
            total -= prod;
        }
    }
    total
}
