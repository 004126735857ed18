//! A self-contained IR module that records instructions and prints them in
//! LLVM assembly syntax.
//!
//! Like LLVM's IR builder it folds instructions whose operands are all
//! constants instead of emitting them.

use std::collections::{HashMap, HashSet};
use std::fmt;

use tracing::warn;

use super::IrBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Double,
    Bool,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Double => write!(f, "double"),
            Type::Bool => write!(f, "i1"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Float(f64),
    Bool(bool),
    Named(String, Type),
}

impl Value {
    pub fn ty(&self) -> Type {
        match self {
            Value::Float(_) => Type::Double,
            Value::Bool(_) => Type::Bool,
            Value::Named(_, ty) => *ty,
        }
    }

    /// `type value`, as operands are written
    fn typed(&self) -> String {
        format!("{} {}", self.ty(), self)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Float(value) => write!(f, "{}", format_double(*value)),
            Value::Bool(value) => write!(f, "{}", value),
            Value::Named(name, _) => write!(f, "%{}", name),
        }
    }
}

/// `1.000000e+00` when six digits are exact, otherwise the hex bit pattern.
fn format_double(value: f64) -> String {
    let short = format!("{:.6e}", value);
    if let Some((mantissa, exponent)) = short.split_once('e') {
        if short.parse::<f64>().ok() == Some(value) {
            if let Ok(exponent) = exponent.parse::<i32>() {
                let sign = if exponent < 0 { '-' } else { '+' };
                return format!("{}e{}{:02}", mantissa, sign, exponent.abs());
            }
        }
    }
    format!("0x{:016X}", value.to_bits())
}

#[derive(Debug, Clone, PartialEq)]
enum Instruction {
    Binary {
        result: String,
        opcode: &'static str,
        lhs: Value,
        rhs: Value,
    },
    BoolToFloat {
        result: String,
        value: Value,
    },
    Call {
        result: String,
        callee: String,
        args: Vec<Value>,
    },
    Ret(Value),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Binary {
                result,
                opcode,
                lhs,
                rhs,
            } => write!(f, "%{} = {} {}, {}", result, opcode, lhs.typed(), rhs),
            Instruction::BoolToFloat { result, value } => {
                write!(f, "%{} = uitofp {} to double", result, value.typed())
            }
            Instruction::Call {
                result,
                callee,
                args,
            } => {
                let args: Vec<String> = args.iter().map(Value::typed).collect();
                write!(f, "%{} = call double @{}({})", result, callee, args.join(", "))
            }
            Instruction::Ret(value) => write!(f, "ret {}", value.typed()),
        }
    }
}

#[derive(Debug, Clone)]
struct FunctionDef {
    name: String,
    params: Vec<String>,
    body: Option<Vec<Instruction>>,
    local_names: HashSet<String>,
}

impl FunctionDef {
    /// LLVM-style uniquing: `tmp`, `tmp1`, `tmp2`, ...
    fn unique_name(&mut self, base: &str) -> String {
        let base = if base.is_empty() { "tmp" } else { base };
        let mut name = base.to_string();
        let mut suffix = 0;
        while self.local_names.contains(&name) {
            suffix += 1;
            name = format!("{}{}", base, suffix);
        }
        self.local_names.insert(name.clone());
        name
    }
}

impl fmt::Display for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            None => {
                let params = vec!["double"; self.params.len()];
                write!(f, "declare double @{}({})", self.name, params.join(", "))
            }
            Some(body) => {
                let params: Vec<String> =
                    self.params.iter().map(|p| format!("double %{}", p)).collect();
                writeln!(f, "define double @{}({}) {{", self.name, params.join(", "))?;
                writeln!(f, "entry:")?;
                for inst in body {
                    writeln!(f, "  {}", inst)?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(usize);

#[derive(Debug, Clone)]
pub struct TextModule {
    name: String,
    /// slots; a removed function's slot is reused by the next declaration
    functions: Vec<Option<FunctionDef>>,
    free_slots: Vec<usize>,
    by_name: HashMap<String, usize>,
    /// live slots in declaration order
    order: Vec<usize>,
    insert_point: Option<usize>,
}

impl TextModule {
    pub fn new(name: &str) -> Self {
        TextModule {
            name: name.to_string(),
            functions: Vec::new(),
            free_slots: Vec::new(),
            by_name: HashMap::new(),
            order: Vec::new(),
            insert_point: None,
        }
    }

    fn function(&self, id: &FunctionId) -> Option<&FunctionDef> {
        self.functions.get(id.0).and_then(Option::as_ref)
    }

    fn function_mut(&mut self, id: &FunctionId) -> Option<&mut FunctionDef> {
        self.functions.get_mut(id.0).and_then(Option::as_mut)
    }

    fn insert_function(&mut self) -> Option<&mut FunctionDef> {
        let id = FunctionId(self.insert_point?);
        self.function_mut(&id)
    }

    /// Appends an instruction producing a fresh local named after `name`.
    fn emit(&mut self, name: &str, ty: Type, make: impl FnOnce(String) -> Instruction) -> Value {
        match self.insert_function() {
            Some(function) => {
                let result = function.unique_name(name);
                let inst = make(result.clone());
                if let Some(body) = function.body.as_mut() {
                    body.push(inst);
                }
                Value::Named(result, ty)
            }
            None => {
                warn!(name, "instruction built without an insertion point");
                Value::Named(name.to_string(), ty)
            }
        }
    }

    fn build_arith(
        &mut self,
        opcode: &'static str,
        lhs: Value,
        rhs: Value,
        name: &str,
        fold: fn(f64, f64) -> f64,
    ) -> Value {
        if let (Value::Float(l), Value::Float(r)) = (&lhs, &rhs) {
            return Value::Float(fold(*l, *r));
        }
        self.emit(name, Type::Double, |result| Instruction::Binary {
            result,
            opcode,
            lhs,
            rhs,
        })
    }
}

impl IrBuilder for TextModule {
    type Value = Value;
    type Function = FunctionId;

    fn const_float(&mut self, value: f64) -> Value {
        Value::Float(value)
    }

    fn build_add(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.build_arith("fadd", lhs, rhs, name, |l, r| l + r)
    }

    fn build_sub(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.build_arith("fsub", lhs, rhs, name, |l, r| l - r)
    }

    fn build_mul(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.build_arith("fmul", lhs, rhs, name, |l, r| l * r)
    }

    fn build_compare_ult(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        if let (Value::Float(l), Value::Float(r)) = (&lhs, &rhs) {
            return Value::Bool(l < r || l.is_nan() || r.is_nan());
        }
        self.emit(name, Type::Bool, |result| Instruction::Binary {
            result,
            opcode: "fcmp ult",
            lhs,
            rhs,
        })
    }

    fn build_bool_to_float(&mut self, value: Value, name: &str) -> Value {
        if let Value::Bool(b) = value {
            return Value::Float(if b { 1.0 } else { 0.0 });
        }
        self.emit(name, Type::Double, |result| Instruction::BoolToFloat { result, value })
    }

    fn build_call(&mut self, function: &FunctionId, args: &[Value], name: &str) -> Value {
        let callee = self
            .function(function)
            .map(|f| f.name.clone())
            .unwrap_or_default();
        let args = args.to_vec();
        self.emit(name, Type::Double, |result| Instruction::Call {
            result,
            callee,
            args,
        })
    }

    fn build_return(&mut self, value: Value) {
        match self.insert_function().and_then(|f| f.body.as_mut()) {
            Some(body) => body.push(Instruction::Ret(value)),
            None => warn!("return built without an insertion point"),
        }
    }

    fn get_function(&self, name: &str) -> Option<FunctionId> {
        self.by_name.get(name).copied().map(FunctionId)
    }

    fn declare_function(&mut self, name: &str, params: &[String]) -> FunctionId {
        let mut function = FunctionDef {
            name: name.to_string(),
            params: Vec::with_capacity(params.len()),
            body: None,
            local_names: HashSet::new(),
        };
        for param in params {
            let unique = function.unique_name(param);
            function.params.push(unique);
        }
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.functions[slot] = Some(function);
                slot
            }
            None => {
                self.functions.push(Some(function));
                self.functions.len() - 1
            }
        };
        self.by_name.insert(name.to_string(), slot);
        self.order.push(slot);
        FunctionId(slot)
    }

    fn count_params(&self, function: &FunctionId) -> usize {
        self.function(function).map_or(0, |f| f.params.len())
    }

    fn params(&self, function: &FunctionId) -> Vec<Value> {
        self.function(function).map_or_else(Vec::new, |f| {
            f.params
                .iter()
                .map(|p| Value::Named(p.clone(), Type::Double))
                .collect()
        })
    }

    fn has_body(&self, function: &FunctionId) -> bool {
        self.function(function).map_or(false, |f| f.body.is_some())
    }

    fn begin_body(&mut self, function: &FunctionId) {
        if let Some(f) = self.function_mut(function) {
            f.body = Some(Vec::new());
            self.insert_point = Some(function.0);
        }
    }

    fn discard_body(&mut self, function: &FunctionId) {
        if let Some(f) = self.function_mut(function) {
            f.body = None;
            f.local_names = f.params.iter().cloned().collect();
        }
        if self.insert_point == Some(function.0) {
            self.insert_point = None;
        }
    }

    fn remove_function(&mut self, function: FunctionId) {
        let removed = match self.functions.get_mut(function.0).and_then(Option::take) {
            Some(removed) => removed,
            None => return,
        };
        if self.by_name.get(&removed.name) == Some(&function.0) {
            self.by_name.remove(&removed.name);
        }
        self.order.retain(|&slot| slot != function.0);
        self.free_slots.push(function.0);
        if self.insert_point == Some(function.0) {
            self.insert_point = None;
        }
    }

    fn verify(&self, function: &FunctionId) -> bool {
        match self.function(function).and_then(|f| f.body.as_ref()) {
            Some(body) => {
                let returns = body
                    .iter()
                    .filter(|inst| matches!(inst, Instruction::Ret(_)))
                    .count();
                returns == 1 && matches!(body.last(), Some(Instruction::Ret(v)) if v.ty() == Type::Double)
            }
            None => false,
        }
    }

    fn print_function(&self, function: &FunctionId) -> String {
        self.function(function)
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    fn print_module(&self) -> String {
        let mut out = format!("; ModuleID = '{}'\n", self.name);
        for function in self.order.iter().filter_map(|&slot| self.functions[slot].as_ref()) {
            out.push('\n');
            out.push_str(&function.to_string());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn doubles_print_like_llvm() {
        assert_eq!(format_double(1.0), "1.000000e+00");
        assert_eq!(format_double(0.5), "5.000000e-01");
        assert_eq!(format_double(1234.5), "1.234500e+03");
        assert_eq!(format_double(0.1), "1.000000e-01");
        assert_eq!(format_double(1.0 / 3.0), "0x3FD5555555555555");
    }

    #[test]
    fn constants_fold() {
        let mut module = TextModule::new("test");
        let two = module.const_float(2.0);
        let three = module.const_float(3.0);
        assert_eq!(module.build_mul(two.clone(), three.clone(), "m"), Value::Float(6.0));
        let less = module.build_compare_ult(two, three, "c");
        assert_eq!(less, Value::Bool(true));
        assert_eq!(module.build_bool_to_float(less, "b"), Value::Float(1.0));
    }

    #[test]
    fn builds_and_prints_a_function() {
        let mut module = TextModule::new("test");
        let sin = module.declare_function("sin", &params(&["x"]));
        let f = module.declare_function("f", &params(&["x", "x"]));
        module.begin_body(&f);
        let args = module.params(&f);
        let sum = module.build_add(args[0].clone(), args[1].clone(), "addtmp");
        let sum2 = module.build_add(sum.clone(), sum, "addtmp");
        let call = module.build_call(&sin, &[sum2], "calltmp");
        module.build_return(call);
        assert!(module.verify(&f));
        assert!(!module.verify(&sin));

        assert_eq!(
            module.print_function(&f),
            "define double @f(double %x, double %x1) {\n\
             entry:\n  \
             %addtmp = fadd double %x, %x1\n  \
             %addtmp1 = fadd double %addtmp, %addtmp\n  \
             %calltmp = call double @sin(double %addtmp1)\n  \
             ret double %calltmp\n\
             }"
        );
        assert_eq!(module.print_function(&sin), "declare double @sin(double)");
    }

    #[test]
    fn discard_and_remove() {
        let mut module = TextModule::new("test");
        let f = module.declare_function("f", &params(&["a"]));
        module.begin_body(&f);
        let a = module.params(&f).remove(0);
        module.build_mul(a.clone(), a, "multmp");
        module.discard_body(&f);
        assert!(!module.has_body(&f));
        assert_eq!(module.print_function(&f), "declare double @f(double)");

        assert_eq!(module.get_function("f"), Some(f));
        module.remove_function(f);
        assert_eq!(module.get_function("f"), None);
        assert_eq!(module.print_module(), "; ModuleID = 'test'\n");
    }

    #[test]
    fn removed_slots_are_reused() {
        let mut module = TextModule::new("test");
        let a = module.declare_function("a", &[]);
        let b = module.declare_function("b", &[]);
        module.remove_function(a);
        let c = module.declare_function("c", &[]);
        assert_eq!(c, a);
        assert_eq!(module.functions.len(), 2);
        assert_eq!(module.get_function("a"), None);
        assert_eq!(module.get_function("b"), Some(b));
        assert_eq!(
            module.print_module(),
            "; ModuleID = 'test'\n\ndeclare double @b()\n\ndeclare double @c()\n"
        );
    }

    #[test]
    fn repl_session_does_not_grow_module() {
        use crate::codegen::Codegen;
        use crate::driver::Driver;
        use crate::parser::{BinopPrecedence, Parser};

        let source = "def f(x) x * 2\n".to_string() + &"f(1); 1 + 2; f(y);\n".repeat(50);
        let parser = Parser::new(source.chars(), BinopPrecedence::default());
        let mut driver = Driver::new(parser, Codegen::new(TextModule::new("test")), Vec::new());
        driver.emit_ir = false;
        driver.run().unwrap();
        let (codegen, _) = driver.into_parts();
        let module = codegen.builder;
        assert_eq!(module.functions.len(), 2);
        assert_eq!(module.order.len(), 1);
        assert_eq!(module.by_name.len(), 1);
        assert!(module.get_function("f").is_some());
    }
}
