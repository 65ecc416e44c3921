mod cost_fn;

pub use cost_fn::CostFn;
