use super::*;

/// Incrementally assembles a [`Program`].
///
/// Instructions are appended at the end of the block selected with
/// [`Builder::position_at_end`] and carry the line set by
/// [`Builder::set_line`]. An empty name leaves a value anonymous.
#[derive(Debug, Default)]
pub struct Builder {
    program: Program,
    cursor: Option<BlockId>,
    line: Option<u32>,
}

fn to_name(name: &str) -> Option<String> {
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finish(self) -> Program {
        self.program
    }

    #[inline]
    pub fn program(&self) -> &Program {
        &self.program
    }

    fn add_value(&mut self, name: &str, ty: Type, kind: ValueKind) -> ValueId {
        let id = ValueId::new(self.program.values.len());
        self.program.values.push(ValueData {
            name: to_name(name),
            ty,
            kind,
        });
        id
    }

    /// Adds a function without a body. Bodies are given by appending blocks.
    pub fn declare_function(&mut self, name: &str, params: &[Type], ret_ty: Type) -> FuncId {
        let func = FuncId::new(self.program.functions.len());
        let value = self.add_value(name, Type::Ptr, ValueKind::Function(func));
        let params = params
            .iter()
            .enumerate()
            .map(|(index, ty)| self.add_value("", ty.clone(), ValueKind::Argument { func, index }))
            .collect();
        self.program.functions.push(Function {
            name: name.to_string(),
            value,
            params,
            ret_ty,
            blocks: vec![],
        });
        func
    }

    /// Declares a function and appends its entry block, positioning the
    /// builder there.
    pub fn define_function(&mut self, name: &str, params: &[Type], ret_ty: Type) -> FuncId {
        let func = self.declare_function(name, params, ret_ty);
        let entry = self.append_block(func, "entry");
        self.position_at_end(entry);
        func
    }

    #[inline]
    pub fn func_value(&self, func: FuncId) -> ValueId {
        self.program.function(func).value
    }

    #[inline]
    pub fn param(&self, func: FuncId, index: usize) -> ValueId {
        self.program.function(func).params[index]
    }

    pub fn name_param(&mut self, func: FuncId, index: usize, name: &str) -> ValueId {
        let param = self.param(func, index);
        self.program.values[param.index()].name = to_name(name);
        param
    }

    pub fn append_block(&mut self, func: FuncId, name: &str) -> BlockId {
        let block = BlockId::new(self.program.blocks.len());
        self.program.blocks.push(Block {
            func,
            name: to_name(name),
            insts: vec![],
        });
        self.program.functions[func.index()].blocks.push(block);
        block
    }

    #[inline]
    pub fn position_at_end(&mut self, block: BlockId) {
        self.cursor = Some(block);
    }

    #[inline]
    pub fn set_line(&mut self, line: u32) {
        self.line = Some(line);
    }

    #[inline]
    pub fn clear_line(&mut self) {
        self.line = None;
    }

    pub fn global(&mut self, name: &str) -> ValueId {
        self.add_value(name, Type::Ptr, ValueKind::Global)
    }

    pub fn const_int(&mut self, n: i64) -> ValueId {
        self.add_value("", Type::Int(64), ValueKind::ConstInt(n))
    }

    pub fn null(&mut self) -> ValueId {
        self.add_value("", Type::Ptr, ValueKind::Null)
    }

    pub fn undef(&mut self, ty: Type) -> ValueId {
        self.add_value("", ty, ValueKind::Undef)
    }

    fn push(&mut self, name: &str, ty: Type, kind: InstKind) -> ValueId {
        let block = self.cursor.expect("builder is not positioned in a block");
        let line = self.line;
        let inst = self.add_value(name, ty, ValueKind::Inst(InstData { block, kind, line }));
        self.program.blocks[block.index()].insts.push(inst);
        inst
    }

    pub fn alloca(&mut self, name: &str, ty: Type) -> ValueId {
        self.push(name, Type::Ptr, InstKind::Alloca(ty))
    }

    pub fn load(&mut self, name: &str, ty: Type, ptr: ValueId) -> ValueId {
        self.push(name, ty, InstKind::Load { ptr })
    }

    pub fn store(&mut self, value: ValueId, ptr: ValueId) -> ValueId {
        self.push("", Type::Void, InstKind::Store { value, ptr })
    }

    pub fn gep(
        &mut self,
        name: &str,
        elem_ty: Type,
        base: ValueId,
        indices: &[ValueId],
    ) -> ValueId {
        let indices = indices.to_vec();
        let kind = InstKind::GetElementPtr {
            base,
            elem_ty,
            indices,
        };
        self.push(name, Type::Ptr, kind)
    }

    pub fn cast(&mut self, name: &str, op: CastOp, value: ValueId, ty: Type) -> ValueId {
        self.push(name, ty, InstKind::Cast { op, value })
    }

    #[inline]
    pub fn bitcast(&mut self, name: &str, value: ValueId) -> ValueId {
        self.cast(name, CastOp::Bitcast, value, Type::Ptr)
    }

    pub fn phi(&mut self, name: &str, ty: Type) -> ValueId {
        self.push(name, ty, InstKind::Phi { incoming: vec![] })
    }

    pub fn add_incoming(&mut self, phi: ValueId, value: ValueId, block: BlockId) {
        let data = &mut self.program.values[phi.index()];
        match &mut data.kind {
            ValueKind::Inst(InstData {
                kind: InstKind::Phi { incoming },
                ..
            }) => incoming.push((value, block)),
            _ => panic!("{:?} is not a phi", phi),
        }
    }

    pub fn call(&mut self, name: &str, ret_ty: Type, callee: ValueId, args: &[ValueId]) -> ValueId {
        let args = args.to_vec();
        self.push(name, ret_ty, InstKind::Call { callee, args })
    }

    pub fn ret(&mut self, value: Option<ValueId>) -> ValueId {
        self.push("", Type::Void, InstKind::Ret { value })
    }

    pub fn br(&mut self, dest: BlockId) -> ValueId {
        self.push("", Type::Void, InstKind::Br { dest })
    }

    pub fn cond_br(&mut self, cond: ValueId, then_dest: BlockId, else_dest: BlockId) -> ValueId {
        let kind = InstKind::CondBr {
            cond,
            then_dest,
            else_dest,
        };
        self.push("", Type::Void, kind)
    }

    pub fn bin_op(&mut self, name: &str, ty: Type, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(name, ty, InstKind::BinOp { lhs, rhs })
    }

    pub fn icmp(&mut self, name: &str, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.push(name, Type::Int(1), InstKind::ICmp { lhs, rhs })
    }

    pub fn unreachable(&mut self) -> ValueId {
        self.push("", Type::Void, InstKind::Unreachable)
    }
}
