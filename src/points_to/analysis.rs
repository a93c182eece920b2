use std::collections::{btree_map, BTreeMap, BTreeSet};

use thiserror::Error;

use super::*;
use crate::{
    dataflow::{self, DataflowResult, DataflowVisitor},
    ir::{FuncId, Program, ValueId},
    line_names::LineNames,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreUpdate {
    /// Every store overwrites all of its candidate targets.
    Strong,
    /// A store overwrites its target only when the address resolves to a
    /// single location and unions into each candidate otherwise.
    WeakOnAmbiguity,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub store_update: StoreUpdate,
    /// Maximum number of functions on the analysis stack.
    pub max_call_depth: usize,
    /// Callees with this name prefix are opaque and never reported.
    pub intrinsic_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_update: StoreUpdate::WeakOnAmbiguity,
            max_call_depth: 64,
            intrinsic_prefix: "llvm.".to_string(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("unsupported instruction `{inst}` in `{func}`: {reason}")]
    UnsupportedInstruction {
        func: String,
        inst: String,
        line: Option<u32>,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CutoffReason {
    /// The callee is already being analyzed on the current path.
    Recursive,
    DepthLimit,
}

/// A call edge that was resolved but not followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cutoff {
    pub call: ValueId,
    pub callee: FuncId,
    pub reason: CutoffReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CallSite {
    Line(u32),
    Inst(ValueId),
}

impl std::fmt::Display for CallSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Line(line) => write!(f, "{}", line),
            Self::Inst(inst) => write!(f, "{:?}", inst),
        }
    }
}

/// Resolved callees per call site. Writes to an existing site union.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallSiteTable {
    sites: BTreeMap<CallSite, BTreeSet<FuncId>>,
}

impl CallSiteTable {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sites.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }

    #[inline]
    pub fn get(&self, site: CallSite) -> Option<&BTreeSet<FuncId>> {
        self.sites.get(&site)
    }

    #[inline]
    pub fn iter(&self) -> btree_map::Iter<'_, CallSite, BTreeSet<FuncId>> {
        self.sites.iter()
    }

    pub fn extend<I: IntoIterator<Item = FuncId>>(&mut self, site: CallSite, callees: I) {
        let mut callees = callees.into_iter().peekable();
        if callees.peek().is_some() {
            self.sites.entry(site).or_default().extend(callees);
        }
    }

    pub fn merge(&mut self, other: &Self) {
        for (site, callees) in &other.sites {
            self.extend(*site, callees.iter().copied());
        }
    }

    /// Line-numbered sites in the report format. Names follow declaration
    /// order.
    pub fn line_names(&self, program: &Program) -> Vec<LineNames> {
        self.sites
            .iter()
            .filter_map(|(site, callees)| {
                let CallSite::Line(line) = site else { return None };
                let mut names = LineNames::new(*line as usize);
                for callee in callees {
                    names.add_name(&program.function(*callee).name);
                }
                Some(names)
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a CallSiteTable {
    type Item = (&'a CallSite, &'a BTreeSet<FuncId>);
    type IntoIter = btree_map::Iter<'a, CallSite, BTreeSet<FuncId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.sites.iter()
    }
}

#[derive(Debug, Clone)]
pub struct FunctionResult {
    pub states: DataflowResult<PointerMap>,
    pub summary: PointerMap,
    pub call_sites: CallSiteTable,
    pub call_targets: BTreeMap<ValueId, BTreeSet<FuncId>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisResults {
    pub call_sites: CallSiteTable,
    /// Resolved callees per call instruction. A call with no resolved target
    /// is absent.
    pub call_targets: BTreeMap<ValueId, BTreeSet<FuncId>>,
    pub cutoffs: BTreeSet<Cutoff>,
}

impl AnalysisResults {
    #[inline]
    pub fn targets(&self, call: ValueId) -> Option<&BTreeSet<FuncId>> {
        self.call_targets.get(&call)
    }

    #[inline]
    pub fn line_names(&self, program: &Program) -> Vec<LineNames> {
        self.call_sites.line_names(program)
    }

    pub fn report(&self, program: &Program) -> String {
        self.line_names(program)
            .iter()
            .map(|names| format!("{}\n", names))
            .collect()
    }
}

/// Analyzes every defined function as a root and merges the results.
pub fn analyze(program: &Program, config: &Config) -> Result<AnalysisResults, AnalysisError> {
    let mut analyzer = Analyzer::new(program, config);
    let mut results = AnalysisResults::default();
    for (func, function) in program.functions() {
        if function.is_declaration() || analyzer.is_intrinsic(func) {
            continue;
        }
        let res = analyzer.run(func)?;
        results.call_sites.merge(&res.call_sites);
        for (call, callees) in res.call_targets {
            results.call_targets.entry(call).or_default().extend(callees);
        }
    }
    results.cutoffs = analyzer.cutoffs;
    Ok(results)
}

/// Union of the exit states of every block.
pub fn summarize(states: &DataflowResult<PointerMap>) -> PointerMap {
    let mut summary = PointerMap::new();
    for (_, exit) in states.values() {
        summary.absorb(exit);
    }
    summary
}

#[allow(missing_debug_implementations)]
pub struct Analyzer<'a> {
    pub program: &'a Program,
    pub config: &'a Config,
    stack: Vec<FuncId>,
    cutoffs: BTreeSet<Cutoff>,
}

impl<'a> Analyzer<'a> {
    pub fn new(program: &'a Program, config: &'a Config) -> Self {
        Self {
            program,
            config,
            stack: vec![],
            cutoffs: BTreeSet::new(),
        }
    }

    #[inline]
    pub fn cutoffs(&self) -> &BTreeSet<Cutoff> {
        &self.cutoffs
    }

    pub fn run(&mut self, func: FuncId) -> Result<FunctionResult, AnalysisError> {
        let program = self.program;
        tracing::info!("analyzing {}", program.function(func).name);

        let states = self.analyze_body(func, &PointerMap::new())?;
        let summary = summarize(&states);

        let mut call_sites = CallSiteTable::new();
        let mut call_targets: BTreeMap<_, BTreeSet<_>> = BTreeMap::new();
        for (loc, pointees) in &summary {
            if loc.kind != LocKind::CallTarget {
                continue;
            }
            let callees: BTreeSet<_> = pointees
                .iter()
                .filter_map(|p| program.as_function(p.base))
                .collect();
            if callees.is_empty() {
                continue;
            }
            let site = match program.line(loc.base) {
                Some(line) => CallSite::Line(line),
                None => CallSite::Inst(loc.base),
            };
            call_sites.extend(site, callees.iter().copied());
            call_targets.entry(loc.base).or_default().extend(callees);
        }

        Ok(FunctionResult {
            states,
            summary,
            call_sites,
            call_targets,
        })
    }

    pub(super) fn analyze_body(
        &mut self,
        func: FuncId,
        init: &PointerMap,
    ) -> Result<DataflowResult<PointerMap>, AnalysisError> {
        let program = self.program;
        self.stack.push(func);
        let res = dataflow::forward(program, func, self, init);
        self.stack.pop();
        res
    }

    #[inline]
    pub fn is_intrinsic(&self, func: FuncId) -> bool {
        self.program
            .function(func)
            .name
            .starts_with(&self.config.intrinsic_prefix)
    }

    /// Whether `callee` may be analyzed from `call` on the current path.
    pub(super) fn can_enter(&mut self, call: ValueId, callee: FuncId) -> bool {
        let reason = if self.stack.contains(&callee) {
            CutoffReason::Recursive
        } else if self.stack.len() >= self.config.max_call_depth {
            CutoffReason::DepthLimit
        } else {
            return true;
        };
        tracing::debug!(
            "not entering {} from {:?}: {:?}",
            self.program.function(callee).name,
            call,
            reason
        );
        self.cutoffs.insert(Cutoff {
            call,
            callee,
            reason,
        });
        false
    }
}

impl DataflowVisitor for Analyzer<'_> {
    type Domain = PointerMap;
    type Error = AnalysisError;

    #[inline]
    fn merge(&mut self, dest: &mut PointerMap, src: &PointerMap) {
        dest.join(src);
    }

    #[inline]
    fn transfer(&mut self, inst: ValueId, state: &mut PointerMap) -> Result<(), AnalysisError> {
        self.transfer_inst(inst, state)
    }
}
