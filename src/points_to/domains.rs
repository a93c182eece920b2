use std::collections::{btree_map, BTreeMap, BTreeSet};

use crate::ir::{Program, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocKind {
    /// Slot `k > 0` of the flattened object at the base.
    Offset(i64),
    /// The base itself. As a memory location this is also slot 0, so the
    /// first field and the whole object share one key.
    Alias,
    /// Return value of the function `base`.
    Return,
    /// Resolved callees of the call instruction `base`.
    CallTarget,
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Loc {
    pub base: ValueId,
    pub kind: LocKind,
}

impl std::fmt::Debug for Loc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            LocKind::Offset(i) => write!(f, "{:?}[{}]", self.base, i),
            LocKind::Alias => write!(f, "{:?}", self.base),
            LocKind::Return => write!(f, "{:?}.ret", self.base),
            LocKind::CallTarget => write!(f, "{:?}.callees", self.base),
        }
    }
}

impl Loc {
    #[inline]
    pub fn new(base: ValueId, kind: LocKind) -> Self {
        Self { base, kind }
    }

    #[inline]
    pub fn alias(base: ValueId) -> Self {
        Self::new(base, LocKind::Alias)
    }

    #[inline]
    pub fn offset(base: ValueId, offset: i64) -> Self {
        if offset == 0 {
            Self::alias(base)
        } else {
            Self::new(base, LocKind::Offset(offset))
        }
    }

    #[inline]
    pub fn ret(func: ValueId) -> Self {
        Self::new(func, LocKind::Return)
    }

    #[inline]
    pub fn call_target(call: ValueId) -> Self {
        Self::new(call, LocKind::CallTarget)
    }

    /// Slot within the base object, if this is a memory location.
    #[inline]
    pub fn slot(self) -> Option<i64> {
        match self.kind {
            LocKind::Alias => Some(0),
            LocKind::Offset(k) => Some(k),
            LocKind::Return | LocKind::CallTarget => None,
        }
    }

    /// Value and memory locations default to aliasing their base when
    /// unconstrained; return and call-target slots default to nothing.
    #[inline]
    pub fn default_pointee(self) -> Option<Self> {
        match self.kind {
            LocKind::Offset(_) | LocKind::Alias => Some(Self::alias(self.base)),
            LocKind::Return | LocKind::CallTarget => None,
        }
    }
}

/// Abstract store mapping each location to the locations it may point to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerMap {
    map: BTreeMap<Loc, BTreeSet<Loc>>,
}

impl PointerMap {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> btree_map::Iter<'_, Loc, BTreeSet<Loc>> {
        self.map.iter()
    }

    #[inline]
    pub fn contains(&self, loc: Loc) -> bool {
        self.map.contains_key(&loc)
    }

    /// The stored set, without applying the default.
    #[inline]
    pub fn explicit(&self, loc: Loc) -> Option<&BTreeSet<Loc>> {
        self.map.get(&loc)
    }

    pub fn values(&self, loc: Loc) -> BTreeSet<Loc> {
        match self.map.get(&loc) {
            Some(pointees) => pointees.clone(),
            None => loc.default_pointee().into_iter().collect(),
        }
    }

    #[inline]
    pub fn insert(&mut self, dst: Loc, pointee: Loc) -> bool {
        self.map.entry(dst).or_default().insert(pointee)
    }

    pub fn extend<I: IntoIterator<Item = Loc>>(&mut self, dst: Loc, pointees: I) {
        self.map.entry(dst).or_default().extend(pointees);
    }

    #[inline]
    pub fn set(&mut self, dst: Loc, pointees: BTreeSet<Loc>) {
        self.map.insert(dst, pointees);
    }

    #[inline]
    pub fn copy(&mut self, dst: Loc, src: Loc) {
        let pointees = self.values(src);
        self.extend(dst, pointees);
    }

    #[inline]
    pub fn copy_from(&mut self, dst: Loc, other: &Self, src: Loc) {
        self.extend(dst, other.values(src));
    }

    #[inline]
    pub fn rewrite(&mut self, dst: Loc, src: Loc) {
        let pointees = self.values(src);
        self.set(dst, pointees);
    }

    #[inline]
    pub fn rewrite_from(&mut self, dst: Loc, other: &Self, src: Loc) {
        self.set(dst, other.values(src));
    }

    /// Control-flow join. A location missing on either side contributes its
    /// default pointee.
    pub fn join(&mut self, other: &Self) {
        let missing: Vec<_> = self
            .map
            .keys()
            .filter(|loc| !other.contains(**loc))
            .filter_map(|loc| Some((*loc, loc.default_pointee()?)))
            .collect();
        for (loc, pointee) in missing {
            self.insert(loc, pointee);
        }
        for (loc, pointees) in &other.map {
            if !self.contains(*loc) {
                if let Some(pointee) = loc.default_pointee() {
                    self.insert(*loc, pointee);
                }
            }
            self.extend(*loc, pointees.iter().copied());
        }
    }

    /// Union of the stored sets, with no defaults involved.
    pub fn absorb(&mut self, other: &Self) {
        for (loc, pointees) in &other.map {
            self.extend(*loc, pointees.iter().copied());
        }
    }

    pub fn display<'a>(&'a self, program: &'a Program) -> PointerMapDisplay<'a> {
        PointerMapDisplay { map: self, program }
    }
}

impl<'a> IntoIterator for &'a PointerMap {
    type Item = (&'a Loc, &'a BTreeSet<Loc>);
    type IntoIter = btree_map::Iter<'a, Loc, BTreeSet<Loc>>;

    fn into_iter(self) -> Self::IntoIter {
        self.map.iter()
    }
}

pub struct PointerMapDisplay<'a> {
    map: &'a PointerMap,
    program: &'a Program,
}

impl std::fmt::Display for PointerMapDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (loc, pointees) in self.map {
            write!(f, "{}", self.program.display_name(loc.base))?;
            match loc.kind {
                LocKind::Alias => write!(f, " = ")?,
                LocKind::Return => write!(f, " returns: ")?,
                LocKind::CallTarget => write!(f, " => ")?,
                LocKind::Offset(i) => write!(f, "[{}]: ", i)?,
            }
            for (i, p) in pointees.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", self.program.display_name(p.base))?;
                if let LocKind::Offset(k) = p.kind {
                    if k > 0 {
                        write!(f, "[{}]", k)?;
                    }
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
