use std::collections::HashMap;

use tracing::debug;

use crate::ast::{ASTNode, Expression, Function, Prototype};
use crate::ir::IrBuilder;

/// Name under which top-level expressions are emitted.
pub const ANONYMOUS_FUNCTION: &str = "__anon_expr";

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum CodegenError {
    #[error("unknown variable name {0}")]
    UnknownVariable(String),
    #[error("invalid binary operator {0}")]
    UnknownOperator(char),
    #[error("unknown function referenced {0}")]
    UnknownFunction(String),
    #[error("incorrect number of arguments passed to {0}: expected {1} found {2}")]
    InvalidCall(String, usize, usize),
    #[error("function {0} cannot be redefined")]
    Redefinition(String),
    #[error("function {0} redeclared with {2} parameters, previously {1}")]
    PrototypeMismatch(String, usize, usize),
    #[error("failed to verify function {0}")]
    InvalidFunction(String),
}

pub struct Codegen<B: IrBuilder> {
    pub builder: B,
    pub named_values: HashMap<String, B::Value>,
}

impl<B: IrBuilder> Codegen<B> {
    pub fn new(builder: B) -> Codegen<B> {
        Codegen {
            builder,
            named_values: HashMap::new(),
        }
    }

    pub fn codegen_expr(&mut self, expr: &Expression) -> Result<B::Value, CodegenError> {
        match expr {
            Expression::Number(value) => Ok(self.builder.const_float(*value)),
            Expression::Variable(name) => match self.named_values.get(name) {
                Some(var) => Ok(var.clone()),
                None => Err(CodegenError::UnknownVariable(name.clone())),
            },
            Expression::Binary(op, left, right) => {
                let lhs = self.codegen_expr(left)?;
                let rhs = self.codegen_expr(right)?;

                match *op {
                    '+' => Ok(self.builder.build_add(lhs, rhs, "addtmp")),
                    '-' => Ok(self.builder.build_sub(lhs, rhs, "subtmp")),
                    '*' => Ok(self.builder.build_mul(lhs, rhs, "multmp")),
                    '<' => {
                        let cmp = self.builder.build_compare_ult(lhs, rhs, "cmptmp");
                        Ok(self.builder.build_bool_to_float(cmp, "booltmp"))
                    }
                    _ => Err(CodegenError::UnknownOperator(*op)),
                }
            }
            Expression::Call(callee, args) => {
                let mut gened_args = Vec::with_capacity(args.len());
                for arg in args {
                    gened_args.push(self.codegen_expr(arg)?);
                }

                let func = match self.builder.get_function(callee) {
                    Some(func) => func,
                    None => return Err(CodegenError::UnknownFunction(callee.clone())),
                };
                let expected = self.builder.count_params(&func);
                if expected != args.len() {
                    return Err(CodegenError::InvalidCall(
                        callee.clone(),
                        expected,
                        args.len(),
                    ));
                }

                Ok(self.builder.build_call(&func, &gened_args, "calltmp"))
            }
        }
    }

    /// Looks up `proto` in the module, declaring it if it is new.
    pub fn compile_proto(&mut self, proto: &Prototype) -> Result<B::Function, CodegenError> {
        let name = if proto.is_anonymous() {
            ANONYMOUS_FUNCTION
        } else {
            proto.name.as_str()
        };

        if let Some(existing) = self.builder.get_function(name) {
            let count = self.builder.count_params(&existing);
            if count != proto.args.len() {
                return Err(CodegenError::PrototypeMismatch(
                    name.to_string(),
                    count,
                    proto.args.len(),
                ));
            }
            return Ok(existing);
        }

        debug!(name, params = proto.args.len(), "declaring function");
        Ok(self.builder.declare_function(name, &proto.args))
    }

    pub fn compile_fn(&mut self, function: &Function) -> Result<B::Function, CodegenError> {
        let Function {
            prototype: proto,
            body,
        } = function;
        let func = self.compile_proto(proto)?;

        if self.builder.has_body(&func) {
            return Err(CodegenError::Redefinition(proto.name.clone()));
        }

        self.builder.begin_body(&func);

        self.named_values.clear();
        self.named_values.reserve(proto.args.len());
        for (name, arg) in proto.args.iter().zip(self.builder.params(&func)) {
            self.named_values.insert(name.clone(), arg);
        }

        let body = match self.codegen_expr(body) {
            Ok(body) => body,
            Err(err) => {
                self.abandon(proto, func);
                return Err(err);
            }
        };

        self.builder.build_return(body);

        if self.builder.verify(&func) {
            debug!(name = %proto.name, "generated function");
            Ok(func)
        } else {
            self.abandon(proto, func);
            Err(CodegenError::InvalidFunction(proto.name.clone()))
        }
    }

    /// Undoes a failed `compile_fn`. A named function falls back to its
    /// declaration; the wrapper of a top-level expression is removed.
    fn abandon(&mut self, proto: &Prototype, func: B::Function) {
        if proto.is_anonymous() {
            self.builder.remove_function(func);
        } else {
            self.builder.discard_body(&func);
        }
    }

    pub fn codegen(&mut self, node: &ASTNode) -> Result<B::Function, CodegenError> {
        match node {
            ASTNode::Function(func) => self.compile_fn(func),
            ASTNode::Extern(proto) => self.compile_proto(proto),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::text::TextModule;
    use crate::parser::{BinopPrecedence, Parser};
    use pretty_assertions::assert_eq;

    fn parser(input: &str) -> Parser<std::str::Chars<'_>> {
        Parser::new(input.chars(), BinopPrecedence::default())
    }

    fn codegen() -> Codegen<TextModule> {
        Codegen::new(TextModule::new("test"))
    }

    fn define(codegen: &mut Codegen<TextModule>, source: &str) -> Result<String, CodegenError> {
        let func = parser(source).parse_definition().unwrap();
        let id = codegen.compile_fn(&func)?;
        Ok(codegen.builder.print_function(&id))
    }

    fn declare(codegen: &mut Codegen<TextModule>, source: &str) {
        let proto = parser(source).parse_extern().unwrap();
        codegen.codegen(&ASTNode::Extern(proto)).unwrap();
    }

    #[test]
    fn codegen_works() {
        let mut codegen = codegen();
        declare(&mut codegen, "extern sin(x)");
        let ir = define(&mut codegen, "def thing(x) sin(x) * x").unwrap();
        assert_eq!(
            ir,
            "define double @thing(double %x) {\n\
             entry:\n  \
             %calltmp = call double @sin(double %x)\n  \
             %multmp = fmul double %calltmp, %x\n  \
             ret double %multmp\n\
             }"
        );
    }

    #[test]
    fn comparison_is_widened_to_double() {
        let mut codegen = codegen();
        let ir = define(&mut codegen, "def lt(a b) a < b").unwrap();
        assert!(ir.contains("%cmptmp = fcmp ult double %a, %b"));
        assert!(ir.contains("%booltmp = uitofp i1 %cmptmp to double"));
        assert!(ir.contains("ret double %booltmp"));
    }

    #[test]
    fn constant_expression_is_folded() {
        let mut codegen = codegen();
        let func = parser("1 + 2 * 3 - (4 < 5)").parse_top_level_expr().unwrap();
        let id = codegen.compile_fn(&func).unwrap();
        assert_eq!(
            codegen.builder.print_function(&id),
            "define double @__anon_expr() {\nentry:\n  ret double 6.000000e+00\n}"
        );
    }

    #[test]
    fn unknown_variable_leaves_module_untouched() {
        let mut codegen = codegen();
        define(&mut codegen, "def id(x) x").unwrap();
        let before = codegen.builder.print_module();

        let res = codegen.codegen_expr(&Expression::Variable("y".to_string()));
        assert_eq!(res, Err(CodegenError::UnknownVariable("y".to_string())));
        assert_eq!(codegen.builder.print_module(), before);
    }

    #[test]
    fn failed_body_keeps_declaration() {
        let mut codegen = codegen();
        assert_eq!(
            define(&mut codegen, "def f(x) x * y"),
            Err(CodegenError::UnknownVariable("y".to_string()))
        );
        let id = codegen.builder.get_function("f").unwrap();
        assert_eq!(codegen.builder.print_function(&id), "declare double @f(double)");

        // the declaration can still be given a body later
        assert!(define(&mut codegen, "def f(y) y * y").is_ok());
    }

    #[test]
    fn symbols_do_not_leak_between_functions() {
        let mut codegen = codegen();
        define(&mut codegen, "def f(a) a").unwrap();
        assert_eq!(
            define(&mut codegen, "def g(b) a"),
            Err(CodegenError::UnknownVariable("a".to_string()))
        );
    }

    #[test]
    fn call_errors() {
        let mut codegen = codegen();
        assert_eq!(
            define(&mut codegen, "def f(x) g(x)"),
            Err(CodegenError::UnknownFunction("g".to_string()))
        );
        assert_eq!(
            define(&mut codegen, "def f(x) g(y)"),
            Err(CodegenError::UnknownVariable("y".to_string()))
        );
        declare(&mut codegen, "extern g(a b)");
        assert_eq!(
            define(&mut codegen, "def h(x) g(x)"),
            Err(CodegenError::InvalidCall("g".to_string(), 2, 1))
        );
    }

    #[test]
    fn failed_top_level_expression_leaves_nothing() {
        let mut codegen = codegen();
        define(&mut codegen, "def f(x) x").unwrap();
        let before = codegen.builder.print_module();

        let func = parser("f(y)").parse_top_level_expr().unwrap();
        assert_eq!(
            codegen.compile_fn(&func),
            Err(CodegenError::UnknownVariable("y".to_string()))
        );
        assert!(codegen.builder.get_function(ANONYMOUS_FUNCTION).is_none());
        assert_eq!(codegen.builder.print_module(), before);
    }

    #[test]
    fn invalid_operator() {
        let mut codegen = codegen();
        let expr = Expression::binary('/', Expression::Number(1.0), Expression::Number(2.0));
        assert_eq!(codegen.codegen_expr(&expr), Err(CodegenError::UnknownOperator('/')));
    }

    #[test]
    fn redefinition_is_rejected() {
        let mut codegen = codegen();
        define(&mut codegen, "def f(x) x").unwrap();
        assert_eq!(
            define(&mut codegen, "def f(x) x + 1"),
            Err(CodegenError::Redefinition("f".to_string()))
        );
        assert_eq!(
            define(&mut codegen, "def f(x y) x"),
            Err(CodegenError::PrototypeMismatch("f".to_string(), 1, 2))
        );
    }
}
