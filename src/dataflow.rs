use std::collections::{BTreeMap, BTreeSet};

use etrace::some_or;

use crate::ir::{BlockId, FuncId, Program, ValueId};

/// Per-block `(entry, exit)` states. Blocks unreachable from the entry block
/// are absent.
pub type DataflowResult<D> = BTreeMap<BlockId, (D, D)>;

pub trait DataflowVisitor {
    type Domain: Clone + PartialEq;
    type Error;

    fn merge(&mut self, dest: &mut Self::Domain, src: &Self::Domain);

    fn transfer(&mut self, inst: ValueId, state: &mut Self::Domain) -> Result<(), Self::Error>;
}

/// Runs `visitor` forward over `func` until no block exit changes.
///
/// A block's entry state accumulates the exits of its already visited
/// predecessors; the entry block additionally starts from `init`.
pub fn forward<V: DataflowVisitor>(
    program: &Program,
    func: FuncId,
    visitor: &mut V,
    init: &V::Domain,
) -> Result<DataflowResult<V::Domain>, V::Error> {
    let mut result = BTreeMap::new();
    let function = program.function(func);
    let entry_block = some_or!(function.entry_block(), return Ok(result));

    let rpo_map = get_rpo_map(program, func);
    let preds = program.predecessors(func);

    let mut work_list = WorkList::new(&rpo_map);
    for bb in &function.blocks {
        work_list.push(*bb);
    }

    while let Some(bb) = work_list.pop() {
        let mut entry = match result.get(&bb) {
            Some((entry, _)) => Some(V::Domain::clone(entry)),
            None if bb == entry_block => Some(init.clone()),
            None => None,
        };
        for pred in preds.get(&bb).into_iter().flatten() {
            let (_, pred_exit) = some_or!(result.get(pred), continue);
            if let Some(entry) = entry.as_mut() {
                visitor.merge(entry, pred_exit);
            } else {
                entry = Some(pred_exit.clone());
            }
        }
        let entry = some_or!(entry, continue);

        let mut exit = entry.clone();
        for inst in &program.block(bb).insts {
            visitor.transfer(*inst, &mut exit)?;
        }

        let changed = result.get(&bb).map_or(true, |(_, old)| *old != exit);
        result.insert(bb, (entry, exit));
        if changed {
            for succ in program.successors(bb) {
                work_list.push(succ);
            }
        }
    }

    Ok(result)
}

struct WorkList<'a> {
    rpo_map: &'a BTreeMap<BlockId, usize>,
    blocks: BTreeMap<usize, BlockId>,
}

impl<'a> WorkList<'a> {
    fn new(rpo_map: &'a BTreeMap<BlockId, usize>) -> Self {
        Self {
            rpo_map,
            blocks: BTreeMap::new(),
        }
    }

    fn pop(&mut self) -> Option<BlockId> {
        let (_, bb) = self.blocks.pop_first()?;
        Some(bb)
    }

    fn push(&mut self, bb: BlockId) {
        let idx = self.rpo_map[&bb];
        self.blocks.insert(idx, bb);
    }
}

/// Reverse post-order index of every block; unreachable blocks follow in
/// layout order.
fn get_rpo_map(program: &Program, func: FuncId) -> BTreeMap<BlockId, usize> {
    let function = program.function(func);
    let mut visited = BTreeSet::new();
    let mut post_order = vec![];

    if let Some(entry) = function.entry_block() {
        visited.insert(entry);
        let mut stack = vec![(entry, program.successors(entry), 0)];
        while let Some((bb, succs, i)) = stack.last_mut() {
            if *i < succs.len() {
                let succ = succs[*i];
                *i += 1;
                if visited.insert(succ) {
                    stack.push((succ, program.successors(succ), 0));
                }
            } else {
                post_order.push(*bb);
                stack.pop();
            }
        }
    }

    let unreachable = function.blocks.iter().filter(|bb| !visited.contains(*bb));
    post_order
        .iter()
        .rev()
        .chain(unreachable)
        .enumerate()
        .map(|(i, bb)| (*bb, i))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Type};

    /// Collects the instructions seen on each path.
    struct Trace;

    impl DataflowVisitor for Trace {
        type Domain = BTreeSet<ValueId>;
        type Error = ValueId;

        fn merge(&mut self, dest: &mut Self::Domain, src: &Self::Domain) {
            dest.extend(src.iter().copied());
        }

        fn transfer(&mut self, inst: ValueId, state: &mut Self::Domain) -> Result<(), ValueId> {
            state.insert(inst);
            Ok(())
        }
    }

    struct Fail(ValueId);

    impl DataflowVisitor for Fail {
        type Domain = ();
        type Error = ValueId;

        fn merge(&mut self, _: &mut (), _: &()) {}

        fn transfer(&mut self, inst: ValueId, _: &mut ()) -> Result<(), ValueId> {
            if inst == self.0 {
                Err(inst)
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn test_diamond() {
        let mut b = Builder::new();
        let f = b.define_function("f", &[Type::Int(1)], Type::Void);
        let c = b.param(f, 0);
        let entry = b.program().function(f).blocks[0];
        let l = b.append_block(f, "l");
        let r = b.append_block(f, "r");
        let m = b.append_block(f, "m");
        let br = b.cond_br(c, l, r);
        b.position_at_end(l);
        let bl = b.br(m);
        b.position_at_end(r);
        let brr = b.br(m);
        b.position_at_end(m);
        let ret = b.ret(None);
        let program = b.finish();

        let res = forward(&program, f, &mut Trace, &BTreeSet::new()).unwrap();
        assert_eq!(res.len(), 4);
        assert_eq!(res[&entry].1, BTreeSet::from([br]));
        assert_eq!(res[&l].1, BTreeSet::from([br, bl]));
        assert_eq!(res[&m].0, BTreeSet::from([br, bl, brr]));
        assert_eq!(res[&m].1, BTreeSet::from([br, bl, brr, ret]));
    }

    #[test]
    fn test_loop_and_unreachable() {
        let mut b = Builder::new();
        let f = b.define_function("f", &[Type::Int(1)], Type::Void);
        let c = b.param(f, 0);
        let head = b.append_block(f, "head");
        let body = b.append_block(f, "body");
        let exit = b.append_block(f, "exit");
        let dead = b.append_block(f, "dead");
        b.br(head);
        b.position_at_end(head);
        b.cond_br(c, body, exit);
        b.position_at_end(body);
        let back = b.br(head);
        b.position_at_end(exit);
        b.ret(None);
        b.position_at_end(dead);
        b.br(exit);
        let program = b.finish();

        let res = forward(&program, f, &mut Trace, &BTreeSet::new()).unwrap();
        assert!(!res.contains_key(&dead));
        assert!(res[&head].0.contains(&back));
        assert!(res[&exit].0.contains(&back));
    }

    #[test]
    fn test_init_and_error() {
        let mut b = Builder::new();
        let f = b.define_function("f", &[], Type::Void);
        let ret = b.ret(None);
        let g = b.declare_function("g", &[], Type::Void);
        let program = b.finish();

        let init = BTreeSet::from([ValueId::new(100)]);
        let res = forward(&program, f, &mut Trace, &init).unwrap();
        let entry = program.function(f).blocks[0];
        assert_eq!(res[&entry].0, init);
        assert_eq!(res[&entry].1, BTreeSet::from([ValueId::new(100), ret]));

        assert!(forward(&program, g, &mut Trace, &init).unwrap().is_empty());
        assert_eq!(forward(&program, f, &mut Fail(ret), &()), Err(ret));
    }
}
