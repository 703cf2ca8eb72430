//! Strided SGEMM used by the dense layers.
//!
//! `C = alpha * A(m x k) * B(k x n) + beta * C`. Strides are given per matrix as
//! (row stride, column stride), so transposes are free.
//!
//! - default: a safe triple loop
//! - feature `matrixmultiply`: delegates to `matrixmultiply::sgemm`

#[allow(clippy::too_many_arguments)]
#[inline]
pub(crate) fn gemm_f32(
    m: usize,
    n: usize,
    k: usize,
    alpha: f32,
    a: &[f32],
    rsa: usize,
    csa: usize,
    b: &[f32],
    rsb: usize,
    csb: usize,
    beta: f32,
    c: &mut [f32],
    rsc: usize,
    csc: usize,
) {
    debug_assert!(m > 0 && n > 0 && k > 0);
    debug_assert!(a.len() > (m - 1) * rsa + (k - 1) * csa);
    debug_assert!(b.len() > (k - 1) * rsb + (n - 1) * csb);
    debug_assert!(c.len() > (m - 1) * rsc + (n - 1) * csc);

    #[cfg(feature = "matrixmultiply")]
    unsafe {
        // SAFETY: the debug asserts above describe the bounds every caller in
        // this crate upholds; all three buffers outlive the call.
        matrixmultiply::sgemm(
            m,
            k,
            n,
            alpha,
            a.as_ptr(),
            rsa as isize,
            csa as isize,
            b.as_ptr(),
            rsb as isize,
            csb as isize,
            beta,
            c.as_mut_ptr(),
            rsc as isize,
            csc as isize,
        );
    }

    #[cfg(not(feature = "matrixmultiply"))]
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0.0_f32;
            let a0 = i * rsa;
            let b0 = j * csb;
            for p in 0..k {
                acc = a[a0 + p * csa].mul_add(b[p * rsb + b0], acc);
            }
            let idx = i * rsc + j * csc;
            c[idx] = if beta == 0.0 {
                alpha * acc
            } else {
                alpha * acc + beta * c[idx]
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_vector_and_transposed_products() {
        // A = [[1, 2, 3], [4, 5, 6]] row-major.
        let a = [1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0];
        let x = [1.0_f32, 0.0, -1.0];
        let mut y = [10.0_f32; 2];
        gemm_f32(2, 1, 3, 1.0, &a, 3, 1, &x, 1, 1, 0.0, &mut y, 1, 1);
        assert_eq!(y, [-2.0, -2.0]);

        // A^T * [1, 1] = column sums.
        let ones = [1.0_f32, 1.0];
        let mut col = [0.0_f32; 3];
        gemm_f32(3, 1, 2, 1.0, &a, 1, 3, &ones, 1, 1, 0.0, &mut col, 1, 1);
        assert_eq!(col, [5.0, 7.0, 9.0]);
    }
}
