mod dense;
mod trace;

pub use dense::Dense;
pub use trace::ActivationTrace;
