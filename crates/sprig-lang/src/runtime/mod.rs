pub mod eval;
pub mod expander;
pub mod random;
pub mod renderer;
pub mod stack;
pub mod value;
