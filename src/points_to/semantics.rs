use std::collections::{BTreeMap, BTreeSet};

use etrace::some_or;

use super::*;
use crate::ir::{FuncId, InstKind, Type, ValueId};

impl Analyzer<'_> {
    /// Pointees of an operand. Allocas, globals and functions are the address
    /// of their own object, so their map entry holds the object's contents.
    pub fn operand(&self, state: &PointerMap, value: ValueId) -> BTreeSet<Loc> {
        if self.program.is_object(value) {
            BTreeSet::from([Loc::alias(value)])
        } else {
            state.values(Loc::alias(value))
        }
    }

    pub fn transfer_inst(
        &mut self,
        inst: ValueId,
        state: &mut PointerMap,
    ) -> Result<(), AnalysisError> {
        let program = self.program;
        let data = some_or!(program.inst(inst), return Ok(()));
        let dst = Loc::alias(inst);
        match &data.kind {
            InstKind::Phi { incoming } if program.is_ptr(inst) => {
                for (value, _) in incoming {
                    if program.is_ptr(*value) {
                        let pointees = self.operand(state, *value);
                        state.extend(dst, pointees);
                    }
                }
            }
            InstKind::Load { ptr } if program.is_ptr(inst) => {
                for p in self.operand(state, *ptr) {
                    state.copy(dst, p);
                }
            }
            InstKind::Store { value, ptr } if program.is_ptr(*value) => {
                let targets = self.operand(state, *ptr);
                let pointees = self.operand(state, *value);
                let strong = match self.config.store_update {
                    StoreUpdate::Strong => true,
                    StoreUpdate::WeakOnAmbiguity => targets.len() == 1,
                };
                for target in targets {
                    if strong {
                        state.set(target, pointees.clone());
                    } else {
                        state.extend(target, pointees.iter().copied());
                    }
                }
            }
            InstKind::GetElementPtr {
                base,
                elem_ty,
                indices,
            } if program.is_ptr(inst) => {
                if indices.is_empty() {
                    let pointees = self.operand(state, *base);
                    state.extend(dst, pointees);
                    return Ok(());
                }
                let offset = self.constant_offset(inst, elem_ty, indices)?;
                for p in self.operand(state, *base) {
                    let slot = some_or!(p.slot(), continue);
                    let slot = slot
                        .checked_add(offset)
                        .ok_or_else(|| self.unsupported(inst, "offset overflow".to_string()))?;
                    state.insert(dst, Loc::offset(p.base, slot));
                }
            }
            InstKind::Cast { value, .. } if program.is_ptr(inst) => {
                let pointees = self.operand(state, *value);
                state.extend(dst, pointees);
            }
            InstKind::Call { callee, args } => self.transfer_call(inst, *callee, args, state)?,
            InstKind::Ret { value: Some(value) } if program.is_ptr(*value) => {
                let func = some_or!(program.owner(inst), return Ok(()));
                let pointees = self.operand(state, *value);
                state.extend(Loc::ret(program.function(func).value), pointees);
            }
            _ => {}
        }
        Ok(())
    }

    /// Slot distance covered by `indices`, walking `elem_ty` in its flattened
    /// layout. Every index must be a non-negative constant.
    fn constant_offset(
        &self,
        inst: ValueId,
        elem_ty: &Type,
        indices: &[ValueId],
    ) -> Result<i64, AnalysisError> {
        let mut ty = elem_ty;
        let mut offset = 0u64;
        for (i, index) in indices.iter().enumerate() {
            let n = match self.program.as_const_int(*index) {
                Some(n) if n >= 0 => n as u64,
                Some(n) => return Err(self.unsupported(inst, format!("negative index {}", n))),
                None => return Err(self.unsupported(inst, "non-constant index".to_string())),
            };
            let step = if i == 0 {
                n.checked_mul(ty.slots())
            } else {
                match ty {
                    Type::Struct(fields) => {
                        let field = some_or!(
                            fields.get(n as usize),
                            return Err(self.unsupported(inst, format!("no field {}", n)))
                        );
                        let before = fields[..n as usize].iter().map(Type::slots).sum::<u64>();
                        ty = field;
                        Some(before)
                    }
                    Type::Array(elem, _) => {
                        ty = elem.as_ref();
                        n.checked_mul(elem.slots())
                    }
                    _ => return Err(self.unsupported(inst, format!("index into {:?}", ty))),
                }
            };
            offset = step
                .and_then(|step| offset.checked_add(step))
                .ok_or_else(|| self.unsupported(inst, "offset overflow".to_string()))?;
        }
        i64::try_from(offset).map_err(|_| self.unsupported(inst, "offset overflow".to_string()))
    }

    fn unsupported(&self, inst: ValueId, reason: String) -> AnalysisError {
        let program = self.program;
        let func = program
            .owner(inst)
            .map(|f| program.function(f).name.clone())
            .unwrap_or_default();
        AnalysisError::UnsupportedInstruction {
            func,
            inst: program.display_name(inst),
            line: program.line(inst),
            reason,
        }
    }

    fn transfer_call(
        &mut self,
        call: ValueId,
        callee: ValueId,
        args: &[ValueId],
        state: &mut PointerMap,
    ) -> Result<(), AnalysisError> {
        let program = self.program;
        let candidates: BTreeSet<FuncId> = self
            .operand(state, callee)
            .into_iter()
            .filter_map(|p| program.as_function(p.base))
            .filter(|f| !self.is_intrinsic(*f))
            .collect();
        if candidates.is_empty() {
            if program.as_function(callee).is_none() {
                tracing::debug!("no resolved target for {:?}", call);
            }
            return Ok(());
        }

        let target = Loc::call_target(call);
        for func in &candidates {
            state.insert(target, Loc::alias(program.function(*func).value));
        }
        tracing::debug!(
            "{:?} may call {:?}",
            call,
            candidates
                .iter()
                .map(|f| program.function(*f).name.as_str())
                .collect::<Vec<_>>()
        );

        let pre_call = state.clone();
        let mut analyzed = 0;
        let mut returned = PointerMap::new();
        let mut written = PointerMap::new();
        let mut writers: BTreeMap<Loc, usize> = BTreeMap::new();
        for func in candidates {
            let function = program.function(func);
            if function.is_declaration() || !self.can_enter(call, func) {
                continue;
            }

            let mut context = pre_call.clone();
            for (param, arg) in function.params.iter().zip(args) {
                if program.is_ptr(*arg) {
                    context.extend(Loc::alias(*param), self.operand(&pre_call, *arg));
                }
            }
            tracing::trace!("entering {}:\n{}", function.name, context.display(program));

            let states = self.analyze_body(func, &context)?;
            let summary = summarize(&states);
            analyzed += 1;
            tracing::trace!("leaving {}:\n{}", function.name, summary.display(program));

            if program.is_ptr(call) {
                returned.copy_from(Loc::alias(call), &summary, Loc::ret(function.value));
            }
            for (loc, _) in &summary {
                if self.escapes(*loc, func) {
                    written.copy_from(*loc, &summary, *loc);
                    *writers.entry(*loc).or_default() += 1;
                }
            }
        }

        if returned.explicit(Loc::alias(call)).is_some_and(|p| !p.is_empty()) {
            state.copy_from(Loc::alias(call), &returned, Loc::alias(call));
        }
        for (loc, n) in writers {
            // a candidate that left `loc` untouched keeps the pre-call facts
            if n < analyzed {
                written.copy_from(loc, &pre_call, loc);
            }
            state.rewrite_from(loc, &written, loc);
        }
        Ok(())
    }

    /// Whether a fact computed inside `func` is visible to its caller.
    fn escapes(&self, loc: Loc, func: FuncId) -> bool {
        match loc.kind {
            LocKind::CallTarget | LocKind::Offset(_) => true,
            LocKind::Alias => self.program.owner(loc.base) != Some(func),
            LocKind::Return => false,
        }
    }
}
