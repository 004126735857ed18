use inkwell::{
    builder::Builder,
    context::Context,
    module::Module,
    types::BasicTypeEnum,
    values::{BasicValueEnum, FunctionValue},
    FloatPredicate,
};

use tracing::warn;

use super::IrBuilder;

pub struct LlvmModule<'a> {
    pub context: &'a Context,
    pub module: Module<'a>,
    pub builder: Builder<'a>,
}

impl<'a> LlvmModule<'a> {
    pub fn new(context: &'a Context, name: &str) -> LlvmModule<'a> {
        let module = context.create_module(name);
        let builder = context.create_builder();

        LlvmModule {
            context,
            module,
            builder,
        }
    }
}

impl<'a> IrBuilder for LlvmModule<'a> {
    type Value = BasicValueEnum<'a>;
    type Function = FunctionValue<'a>;

    fn const_float(&mut self, value: f64) -> Self::Value {
        self.context.f64_type().const_float(value).into()
    }

    fn build_add(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value {
        self.builder
            .build_float_add(lhs.into_float_value(), rhs.into_float_value(), name)
            .into()
    }

    fn build_sub(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value {
        self.builder
            .build_float_sub(lhs.into_float_value(), rhs.into_float_value(), name)
            .into()
    }

    fn build_mul(&mut self, lhs: Self::Value, rhs: Self::Value, name: &str) -> Self::Value {
        self.builder
            .build_float_mul(lhs.into_float_value(), rhs.into_float_value(), name)
            .into()
    }

    fn build_compare_ult(
        &mut self,
        lhs: Self::Value,
        rhs: Self::Value,
        name: &str,
    ) -> Self::Value {
        self.builder
            .build_float_compare(
                FloatPredicate::ULT,
                lhs.into_float_value(),
                rhs.into_float_value(),
                name,
            )
            .into()
    }

    fn build_bool_to_float(&mut self, value: Self::Value, name: &str) -> Self::Value {
        self.builder
            .build_unsigned_int_to_float(value.into_int_value(), self.context.f64_type(), name)
            .into()
    }

    fn build_call(
        &mut self,
        function: &Self::Function,
        args: &[Self::Value],
        name: &str,
    ) -> Self::Value {
        self.builder
            .build_call(*function, args, name)
            .try_as_basic_value()
            .left()
            .unwrap_or_else(|| self.context.f64_type().const_float(0.0).into())
    }

    fn build_return(&mut self, value: Self::Value) {
        self.builder.build_return(Some(&value));
    }

    fn get_function(&self, name: &str) -> Option<Self::Function> {
        self.module.get_function(name)
    }

    fn declare_function(&mut self, name: &str, params: &[String]) -> Self::Function {
        let args_types = std::iter::repeat(self.context.f64_type())
            .take(params.len())
            .map(|f| f.into())
            .collect::<Vec<BasicTypeEnum>>();

        let fn_type = self.context.f64_type().fn_type(args_types.as_slice(), false);
        let fn_val = self.module.add_function(name, fn_type, None);

        for (arg, name) in fn_val.get_param_iter().zip(params) {
            arg.into_float_value().set_name(name);
        }

        fn_val
    }

    fn count_params(&self, function: &Self::Function) -> usize {
        function.count_params() as usize
    }

    fn params(&self, function: &Self::Function) -> Vec<Self::Value> {
        function.get_param_iter().collect()
    }

    fn has_body(&self, function: &Self::Function) -> bool {
        function.count_basic_blocks() > 0
    }

    fn begin_body(&mut self, function: &Self::Function) {
        let entry = self.context.append_basic_block(*function, "entry");
        self.builder.position_at_end(entry);
    }

    fn discard_body(&mut self, function: &Self::Function) {
        for block in function.get_basic_blocks() {
            if unsafe { block.delete() }.is_err() {
                warn!("failed to delete basic block while discarding a function body");
            }
        }
    }

    fn remove_function(&mut self, function: Self::Function) {
        unsafe {
            function.delete();
        }
    }

    fn verify(&self, function: &Self::Function) -> bool {
        function.verify(false)
    }

    fn print_function(&self, function: &Self::Function) -> String {
        function.print_to_string().to_string_lossy().into_owned()
    }

    fn print_module(&self) -> String {
        self.module.print_to_string().to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use inkwell::context::Context;

    use super::LlvmModule;
    use crate::codegen::Codegen;
    use crate::ir::IrBuilder;
    use crate::parser::{BinopPrecedence, Parser};

    #[test]
    fn codegen_works() {
        let context = Context::create();
        let mut codegen = Codegen::new(LlvmModule::new(&context, "test"));
        let mut parser = Parser::new("thing(x) sin(x) * x".chars(), BinopPrecedence::default());
        codegen
            .compile_proto(&crate::ast::Prototype {
                name: "sin".to_string(),
                args: vec!["x".to_string()],
            })
            .unwrap();
        let prototype = parser.parse_prototype().unwrap();
        let body = parser.parse_expression().unwrap();
        let func = codegen
            .compile_fn(&crate::ast::Function { prototype, body })
            .unwrap();
        let ir = codegen.builder.print_function(&func);
        assert!(ir.contains("fmul double"));
        assert!(ir.contains("call double @sin"));
    }
}
