// ============================================================================
// Fibonacci Membership
// ============================================================================
//
// A positive integer n is a Fibonacci number iff 5n²+4 or 5n²-4 is a
// perfect square. The square test runs on u128 with an integer square root,
// so it stays exact across the whole i64 domain (a float sqrt loses
// precision well before i64::MAX).
//
// ============================================================================

/// Floor of the square root of `n`.
fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }

    // Start at a power of two that is >= sqrt(n) and walk Newton down.
    let bits = 128 - n.leading_zeros();
    let mut x: u128 = 1 << bits.div_ceil(2);
    loop {
        let y = (x + n / x) / 2;
        if y >= x {
            return x;
        }
        x = y;
    }
}

fn is_perfect_square(n: u128) -> bool {
    let root = isqrt(n);
    root * root == n
}

/// Whether `n` belongs to the Fibonacci sequence 1, 1, 2, 3, 5, 8, ...
///
/// `n <= 0` is never a member.
pub fn is_fibonacci(n: i64) -> bool {
    if n <= 0 {
        return false;
    }

    let n = n as u128;
    // 5n² only overflows u128 above F(92), the largest member that fits in i64
    let Some(five_n_squared) = n.checked_mul(n).and_then(|sq| sq.checked_mul(5)) else {
        return false;
    };

    five_n_squared.checked_add(4).is_some_and(is_perfect_square)
        || is_perfect_square(five_n_squared - 4)
}

/// Smallest Fibonacci number strictly greater than `n`.
///
/// Returns 1 for `n <= 0`, and `None` once the next member no longer fits
/// in an i64.
pub fn next_fibonacci_after(n: i64) -> Option<i64> {
    if n <= 0 {
        return Some(1);
    }

    let (mut a, mut b) = (1i64, 1i64);
    while b <= n {
        let next = a.checked_add(b)?;
        a = b;
        b = next;
    }
    Some(b)
}
