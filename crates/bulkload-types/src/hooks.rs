//! Lifecycle hooks
//!
//! A descriptor declares the hooks it wants by setting them; undeclared hooks
//! are never called. Type and instance hooks come in two shapes: the current
//! one-argument form and the deprecated two-argument `Legacy` form, which is
//! still invoked (with an empty map as its second argument) but makes the
//! engine emit a compatibility warning once per run.

use std::fmt;
use std::sync::Arc;

use crate::record::Record;
use crate::store::Entity;

/// What the engine should do after a hook returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFlow {
    Continue,
    /// Stop processing the current record without reporting anything
    Skip,
}

pub type HookResult = anyhow::Result<HookFlow>;

type GlobalFn = dyn Fn() -> anyhow::Result<()> + Send + Sync;
type TypeFn = dyn Fn(&mut Record) -> HookResult + Send + Sync;
type LegacyTypeFn = dyn Fn(&mut Record, &Record) -> HookResult + Send + Sync;
type InstanceFn = dyn Fn(&mut Entity, &Record) -> HookResult + Send + Sync;
type LegacyInstanceFn = dyn Fn(&mut Entity, &Record, &Record) -> HookResult + Send + Sync;

/// Run-level hook (`before_import` / `after_import`)
#[derive(Clone)]
pub struct GlobalHook(Arc<GlobalFn>);

impl GlobalHook {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self(Arc::new(hook))
    }

    pub fn call(&self) -> anyhow::Result<()> {
        (self.0)()
    }
}

/// Hook on the model type, before an instance exists; may rewrite the record
#[derive(Clone)]
pub enum TypeHook {
    Current(Arc<TypeFn>),
    Legacy(Arc<LegacyTypeFn>),
}

impl TypeHook {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(&mut Record) -> HookResult + Send + Sync + 'static,
    {
        TypeHook::Current(Arc::new(hook))
    }

    /// Deprecated two-argument shape
    pub fn legacy<F>(hook: F) -> Self
    where
        F: Fn(&mut Record, &Record) -> HookResult + Send + Sync + 'static,
    {
        TypeHook::Legacy(Arc::new(hook))
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, TypeHook::Legacy(_))
    }

    pub fn call(&self, record: &mut Record) -> HookResult {
        match self {
            TypeHook::Current(hook) => hook(record),
            TypeHook::Legacy(hook) => hook(record, &Record::new()),
        }
    }
}

/// Hook on an entity instance; receives the instance and the input record
#[derive(Clone)]
pub enum InstanceHook {
    Current(Arc<InstanceFn>),
    Legacy(Arc<LegacyInstanceFn>),
}

impl InstanceHook {
    pub fn new<F>(hook: F) -> Self
    where
        F: Fn(&mut Entity, &Record) -> HookResult + Send + Sync + 'static,
    {
        InstanceHook::Current(Arc::new(hook))
    }

    /// Deprecated two-argument shape
    pub fn legacy<F>(hook: F) -> Self
    where
        F: Fn(&mut Entity, &Record, &Record) -> HookResult + Send + Sync + 'static,
    {
        InstanceHook::Legacy(Arc::new(hook))
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, InstanceHook::Legacy(_))
    }

    pub fn call(&self, entity: &mut Entity, record: &Record) -> HookResult {
        match self {
            InstanceHook::Current(hook) => hook(entity, record),
            InstanceHook::Legacy(hook) => hook(entity, record, &Record::new()),
        }
    }
}

/// Hooks a model declares, one optional slot per lifecycle point
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    pub before_import: Option<GlobalHook>,
    pub after_import: Option<GlobalHook>,
    pub before_find: Option<TypeHook>,
    pub before_attributes: Option<InstanceHook>,
    pub before_associations: Option<InstanceHook>,
    pub before_save: Option<InstanceHook>,
    pub after_save: Option<InstanceHook>,
    pub after_association_error: Option<InstanceHook>,
    pub after_save_error: Option<InstanceHook>,
}

impl LifecycleHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_before_import(mut self, hook: GlobalHook) -> Self {
        self.before_import = Some(hook);
        self
    }

    pub fn with_after_import(mut self, hook: GlobalHook) -> Self {
        self.after_import = Some(hook);
        self
    }

    pub fn with_before_find(mut self, hook: TypeHook) -> Self {
        self.before_find = Some(hook);
        self
    }

    pub fn with_before_attributes(mut self, hook: InstanceHook) -> Self {
        self.before_attributes = Some(hook);
        self
    }

    pub fn with_before_associations(mut self, hook: InstanceHook) -> Self {
        self.before_associations = Some(hook);
        self
    }

    pub fn with_before_save(mut self, hook: InstanceHook) -> Self {
        self.before_save = Some(hook);
        self
    }

    pub fn with_after_save(mut self, hook: InstanceHook) -> Self {
        self.after_save = Some(hook);
        self
    }

    pub fn with_after_association_error(mut self, hook: InstanceHook) -> Self {
        self.after_association_error = Some(hook);
        self
    }

    pub fn with_after_save_error(mut self, hook: InstanceHook) -> Self {
        self.after_save_error = Some(hook);
        self
    }

    /// Names of the declared hooks, in lifecycle order
    pub fn declared(&self) -> Vec<&'static str> {
        let slots = [
            ("before_import", self.before_import.is_some()),
            ("before_find", self.before_find.is_some()),
            ("before_attributes", self.before_attributes.is_some()),
            ("before_associations", self.before_associations.is_some()),
            ("before_save", self.before_save.is_some()),
            ("after_save", self.after_save.is_some()),
            ("after_association_error", self.after_association_error.is_some()),
            ("after_save_error", self.after_save_error.is_some()),
            ("after_import", self.after_import.is_some()),
        ];
        slots
            .into_iter()
            .filter_map(|(name, set)| set.then_some(name))
            .collect()
    }
}

impl fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHooks")
            .field("declared", &self.declared())
            .finish()
    }
}
