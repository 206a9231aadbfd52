/**
 * Dense Matrix Primitives
 *
 * Row-major operations over caller-owned flat buffers. Every call takes its
 * dimensions explicitly; nothing here allocates. Outputs must not alias
 * inputs unless the function works in place (scale, invert's scratch input).
 */

use crate::error::{NavError, Result};

//pivots smaller than this are treated as zero by invert_pivoted
pub const PIVOT_EPSILON: f32 = 1e-9;

//n x n identity into a
pub fn identity(a: &mut [f32], n: usize){
    debug_assert!(a.len() >= n * n);
    for r in 0..n{
        for c in 0..n{
            a[r * n + c] = if r == c{ 1.0 }else{ 0.0 };
        }
    }
}

//copy m x n matrix a into b
pub fn copy(a: &[f32], m: usize, n: usize, b: &mut [f32]){
    b[..m * n].copy_from_slice(&a[..m * n]);
}

//b (n x m) = a (m x n) transposed
pub fn transpose(a: &[f32], m: usize, n: usize, b: &mut [f32]){
    debug_assert!(a.len() >= m * n && b.len() >= m * n);
    for r in 0..m{
        for c in 0..n{
            b[m * c + r] = a[n * r + c];
        }
    }
}

pub fn add(a: &[f32], b: &[f32], m: usize, n: usize, c: &mut [f32]){
    for i in 0..m * n{
        c[i] = a[i] + b[i];
    }
}

pub fn subtract(a: &[f32], b: &[f32], m: usize, n: usize, c: &mut [f32]){
    for i in 0..m * n{
        c[i] = a[i] - b[i];
    }
}

//in place a *= k
pub fn scale(a: &mut [f32], m: usize, n: usize, k: f32){
    for v in a[..m * n].iter_mut(){
        *v *= k;
    }
}

/// `c (m x n) = a (m x p) * b (p x n)`. `c` must not alias `a` or `b`,
/// which the borrow checker already guarantees for slices.
pub fn multiply(a: &[f32], b: &[f32], m: usize, p: usize, n: usize, c: &mut [f32]){
    debug_assert!(a.len() >= m * p && b.len() >= p * n && c.len() >= m * n);
    for r in 0..m{
        for col in 0..n{
            let mut sum = 0.0;
            for k in 0..p{
                sum += a[p * r + k] * b[n * k + col];
            }
            c[n * r + col] = sum;
        }
    }
}

/// Gauss-Jordan inversion without pivoting. Writes the inverse of `a` into
/// `b` and leaves `a` reduced (garbage) on return.
///
/// A zero pivot divides by zero and the result fills with inf/NaN. Nothing
/// is reported; callers that care check the output with [`all_finite`] or
/// use [`invert_pivoted`].
pub fn invert(a: &mut [f32], n: usize, b: &mut [f32]){
    identity(b, n);

    for i in 0..n{
        let k = a[i * n + i];
        for c in 0..n{
            a[i * n + c] /= k;
            b[i * n + c] /= k;
        }

        for r in 0..n{
            if r == i{
                continue;
            }
            let k = a[r * n + i];
            for c in 0..n{
                a[r * n + c] -= k * a[i * n + c];
                b[r * n + c] -= k * b[i * n + c];
            }
        }
    }
}

/// Gauss-Jordan inversion with partial (row) pivoting.
///
/// Numerically different from [`invert`] for matrices that needed a row
/// swap, so it is kept as a separate entry point. Fails instead of producing
/// NaN when the largest remaining pivot is below [`PIVOT_EPSILON`].
pub fn invert_pivoted(a: &mut [f32], n: usize, b: &mut [f32]) -> Result<()>{
    identity(b, n);

    for i in 0..n{
        let mut best = i;
        for r in (i + 1)..n{
            if a[r * n + i].abs() > a[best * n + i].abs(){
                best = r;
            }
        }
        if a[best * n + i].abs() < PIVOT_EPSILON{
            return Err(NavError::SingularMatrix{ pivot: i });
        }
        if best != i{
            for c in 0..n{
                a.swap(i * n + c, best * n + c);
                b.swap(i * n + c, best * n + c);
            }
        }

        let k = a[i * n + i];
        for c in 0..n{
            a[i * n + c] /= k;
            b[i * n + c] /= k;
        }

        for r in 0..n{
            if r == i{
                continue;
            }
            let k = a[r * n + i];
            if k == 0.0{
                continue;
            }
            for c in 0..n{
                a[r * n + c] -= k * a[i * n + c];
                b[r * n + c] -= k * b[i * n + c];
            }
        }
    }

    Ok(())
}

pub fn all_finite(a: &[f32]) -> bool{
    a.iter().all(|v| v.is_finite())
}

//sum of the diagonal of an n x n matrix
pub fn trace(a: &[f32], n: usize) -> f32{
    (0..n).map(|i| a[i * n + i]).sum()
}
