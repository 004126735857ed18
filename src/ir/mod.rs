//! The instruction-building capability the code generator lowers into.
//!
//! Every value in the language is a `double`; the only other type a backend
//! sees is the boolean produced by a comparison, which is widened back to a
//! double straight away.

#[cfg(feature = "llvm")]
pub mod llvm;
pub mod text;

pub trait IrBuilder {
    type Value: Clone;
    type Function: Clone;

    fn const_float(&mut self, value: f64) -> Self::Value;
    fn build_add(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value;
    fn build_sub(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value;
    fn build_mul(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value;
    /// Unordered less-than; yields a boolean.
    fn build_compare_ult(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str)
        -> Self::Value;
    /// Unsigned conversion of a boolean to `0.0` / `1.0`.
    fn build_bool_to_float(&mut self, value: Self::Value, name: &str) -> Self::Value;
    fn build_call(&mut self, function: &Self::Function, args: &[Self::Value], name: &str)
        -> Self::Value;
    fn build_return(&mut self, value: Self::Value);

    fn get_function(&self, name: &str) -> Option<Self::Function>;
    /// Adds `double name(double, ...)` with parameters named after `params`.
    fn declare_function(&mut self, name: &str, params: &[String]) -> Self::Function;
    fn count_params(&self, function: &Self::Function) -> usize;
    fn params(&self, function: &Self::Function) -> Vec<Self::Value>;
    fn has_body(&self, function: &Self::Function) -> bool;
    /// Opens the entry block of `function` and points the builder at it.
    fn begin_body(&mut self, function: &Self::Function);
    /// Drops everything emitted into `function`, leaving a declaration.
    fn discard_body(&mut self, function: &Self::Function);
    fn remove_function(&mut self, function: Self::Function);
    fn verify(&self, function: &Self::Function) -> bool;

    fn print_function(&self, function: &Self::Function) -> String;
    fn print_module(&self) -> String;
}
