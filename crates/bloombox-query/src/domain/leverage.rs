//! Leverage: the scale-factor pair carried bottom-up through a tree
//!
//! Every node gets a `factor` (applied if the node's count flows upward as
//! is) and a `complement` (applied if an enclosing NOT flips it). Negation
//! is just the swap.

/// Scale-factor pair for one expression node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Leverage {
    pub factor: f64,
    pub complement: f64,
}

impl Leverage {
    pub fn new(factor: f64, complement: f64) -> Self {
        Self { factor, complement }
    }

    /// Leverage of the negated node: factor and complement trade places.
    pub fn negate(self) -> Self {
        Self {
            factor: self.complement,
            complement: self.factor,
        }
    }
}

/// Complement factor for a node counted `c` out of `n` sample rows, scaled
/// by `f` toward target `t`.
///
/// The scaled complement count must make the two halves sum to the target:
/// `(n - c) * complement + c * f = t`, giving `(t - c*f) / (n - c)`. If the
/// node itself overshoots the target (`c*f > t`) that formula would go
/// negative; the overshoot is instead spread over the complement and damped
/// by how far past the target the node landed.
pub fn complement_factor(c: f64, f: f64, n: f64, t: f64) -> f64 {
    if n <= c {
        return 0.0;
    }
    let scaled = c * f;
    if scaled <= t {
        (t - scaled) / (n - c)
    } else {
        (scaled - t) / (n - c) * (t / scaled)
    }
}
