//! Control-flow-graph IR consumed by the analyses.
//!
//! Every entity is identified by a dense index that stays valid for the
//! lifetime of its [`Program`]. Instructions are values, so an instruction and
//! its result share one [`ValueId`].

mod builder;

use std::{collections::BTreeMap, fmt};

pub use builder::*;

macro_rules! index_type {
    ($name:ident, $prefix:literal) => {
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub fn new(index: usize) -> Self {
                Self(index as u32)
            }

            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

index_type!(ValueId, "%");
index_type!(BlockId, "bb");
index_type!(FuncId, "fn");

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Int(u32),
    Float,
    Ptr,
    Struct(Vec<Type>),
    Array(Box<Type>, u64),
    Label,
}

impl Type {
    #[inline]
    pub fn is_ptr(&self) -> bool {
        matches!(self, Self::Ptr)
    }

    /// Number of scalar slots in the flattened layout; never zero.
    pub fn slots(&self) -> u64 {
        match self {
            Self::Struct(fields) => fields.iter().map(Self::slots).sum::<u64>().max(1),
            Self::Array(elem, len) => elem.slots().saturating_mul((*len).max(1)),
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastOp {
    Bitcast,
    IntToPtr,
    PtrToInt,
    AddrSpaceCast,
    Trunc,
    ZExt,
    SExt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstKind {
    Alloca(Type),
    Load {
        ptr: ValueId,
    },
    Store {
        value: ValueId,
        ptr: ValueId,
    },
    /// Address computation. The first index steps over whole `elem_ty`
    /// values; each following index selects a field or element inside.
    GetElementPtr {
        base: ValueId,
        elem_ty: Type,
        indices: Vec<ValueId>,
    },
    Cast {
        op: CastOp,
        value: ValueId,
    },
    Phi {
        incoming: Vec<(ValueId, BlockId)>,
    },
    Call {
        callee: ValueId,
        args: Vec<ValueId>,
    },
    Ret {
        value: Option<ValueId>,
    },
    Br {
        dest: BlockId,
    },
    CondBr {
        cond: ValueId,
        then_dest: BlockId,
        else_dest: BlockId,
    },
    BinOp {
        lhs: ValueId,
        rhs: ValueId,
    },
    ICmp {
        lhs: ValueId,
        rhs: ValueId,
    },
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstData {
    pub block: BlockId,
    pub kind: InstKind,
    /// Debug source line.
    pub line: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Function(FuncId),
    Global,
    Argument { func: FuncId, index: usize },
    Inst(InstData),
    ConstInt(i64),
    Null,
    Undef,
}

#[derive(Debug, Clone)]
pub struct ValueData {
    pub name: Option<String>,
    pub ty: Type,
    pub kind: ValueKind,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub value: ValueId,
    pub params: Vec<ValueId>,
    pub ret_ty: Type,
    pub blocks: Vec<BlockId>,
}

impl Function {
    #[inline]
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    #[inline]
    pub fn entry_block(&self) -> Option<BlockId> {
        self.blocks.first().copied()
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub func: FuncId,
    pub name: Option<String>,
    pub insts: Vec<ValueId>,
}

#[derive(Debug, Clone, Default)]
pub struct Program {
    values: Vec<ValueData>,
    blocks: Vec<Block>,
    functions: Vec<Function>,
}

impl Program {
    pub fn functions(&self) -> impl Iterator<Item = (FuncId, &Function)> + '_ {
        self.functions
            .iter()
            .enumerate()
            .map(|(i, f)| (FuncId::new(i), f))
    }

    #[inline]
    pub fn function(&self, func: FuncId) -> &Function {
        &self.functions[func.index()]
    }

    pub fn function_by_name(&self, name: &str) -> Option<FuncId> {
        self.functions()
            .find_map(|(id, f)| if f.name == name { Some(id) } else { None })
    }

    #[inline]
    pub fn block(&self, block: BlockId) -> &Block {
        &self.blocks[block.index()]
    }

    #[inline]
    pub fn value(&self, value: ValueId) -> &ValueData {
        &self.values[value.index()]
    }

    #[inline]
    pub fn ty(&self, value: ValueId) -> &Type {
        &self.value(value).ty
    }

    #[inline]
    pub fn is_ptr(&self, value: ValueId) -> bool {
        self.ty(value).is_ptr()
    }

    pub fn as_function(&self, value: ValueId) -> Option<FuncId> {
        match self.value(value).kind {
            ValueKind::Function(func) => Some(func),
            _ => None,
        }
    }

    pub fn as_const_int(&self, value: ValueId) -> Option<i64> {
        match self.value(value).kind {
            ValueKind::ConstInt(n) => Some(n),
            _ => None,
        }
    }

    pub fn inst(&self, value: ValueId) -> Option<&InstData> {
        match &self.value(value).kind {
            ValueKind::Inst(inst) => Some(inst),
            _ => None,
        }
    }

    #[inline]
    pub fn line(&self, value: ValueId) -> Option<u32> {
        self.inst(value)?.line
    }

    /// The function an instruction or argument belongs to.
    pub fn owner(&self, value: ValueId) -> Option<FuncId> {
        match &self.value(value).kind {
            ValueKind::Argument { func, .. } => Some(*func),
            ValueKind::Inst(inst) => Some(self.block(inst.block).func),
            _ => None,
        }
    }

    /// Allocas, globals and functions: values that are the address of an
    /// object rather than a loaded or computed pointer.
    pub fn is_object(&self, value: ValueId) -> bool {
        match &self.value(value).kind {
            ValueKind::Function(_) | ValueKind::Global => true,
            ValueKind::Inst(inst) => matches!(inst.kind, InstKind::Alloca(_)),
            _ => false,
        }
    }

    #[inline]
    pub fn name(&self, value: ValueId) -> Option<&str> {
        self.value(value).name.as_deref()
    }

    pub fn display_name(&self, value: ValueId) -> String {
        let data = self.value(value);
        if let Some(name) = self.name(value) {
            return name.to_string();
        }
        match data.kind {
            ValueKind::ConstInt(n) => n.to_string(),
            ValueKind::Null => "null".to_string(),
            ValueKind::Undef => "undef".to_string(),
            _ => format!("{:?}", value),
        }
    }

    pub fn terminator(&self, block: BlockId) -> Option<&InstKind> {
        let inst = self.block(block).insts.last()?;
        Some(&self.inst(*inst)?.kind)
    }

    pub fn successors(&self, block: BlockId) -> Vec<BlockId> {
        match self.terminator(block) {
            Some(InstKind::Br { dest }) => vec![*dest],
            Some(InstKind::CondBr {
                then_dest,
                else_dest,
                ..
            }) => {
                if then_dest == else_dest {
                    vec![*then_dest]
                } else {
                    vec![*then_dest, *else_dest]
                }
            }
            _ => vec![],
        }
    }

    pub fn predecessors(&self, func: FuncId) -> BTreeMap<BlockId, Vec<BlockId>> {
        let blocks = &self.function(func).blocks;
        let mut preds: BTreeMap<_, Vec<_>> = blocks.iter().map(|bb| (*bb, vec![])).collect();
        for bb in blocks {
            for succ in self.successors(*bb) {
                preds.entry(succ).or_default().push(*bb);
            }
        }
        preds
    }
}
