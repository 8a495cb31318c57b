//! Class registry
//!
//! Classes of every loaded module live in one arena. Handing a class out
//! through [`Vm::load_class`] binds it: the first request runs its
//! `<clinit>` on the class loader thread before the class is returned, so a
//! static initializer runs exactly once and always before first use.

use crate::class::{Class, ClassId, Method, ModulePool};
use crate::vm::Vm;
use crate::{VmError, VmResult};
use dexvm_bytecode::DexFile;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Arena of module-defined classes
#[derive(Debug, Default)]
pub struct ClassRegistry {
    /// Classes indexed by id
    classes: Vec<Class>,
    /// Class name to id mapping
    by_name: FxHashMap<String, ClassId>,
}

impl ClassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every class of a parsed module
    ///
    /// A class whose name is already registered keeps its first definition.
    pub fn register_module(&mut self, dex: &DexFile) -> VmResult<usize> {
        let pool = Rc::new(ModulePool::from_dex(dex));
        let mut added = 0;
        for def in &dex.class_defs {
            if self.by_name.contains_key(&def.name) {
                log::debug!("class {} already registered, keeping the first", def.name);
                continue;
            }
            let id = ClassId(self.classes.len());
            let class = Class::from_def(id, def, &pool)?;
            self.by_name.insert(class.name.clone(), id);
            self.classes.push(class);
            added += 1;
        }
        Ok(added)
    }

    /// Look up a class id without binding it
    pub fn get(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    /// Check whether a module defines `name`
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Class by id
    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    /// Mutable class by id
    pub fn class_mut(&mut self, id: ClassId) -> &mut Class {
        &mut self.classes[id.index()]
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Check whether no class is registered
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Iterate over all classes
    pub fn iter(&self) -> impl Iterator<Item = &Class> {
        self.classes.iter()
    }
}

impl Vm {
    /// Resolve a class by internal name, binding it on first use
    ///
    /// Returns `None` when no loaded module defines the class; callers then
    /// fall back to the shim.
    pub fn load_class(&mut self, name: &str) -> VmResult<Option<ClassId>> {
        let Some(id) = self.registry.get(name) else {
            return Ok(None);
        };
        if self.registry.class(id).bound {
            return Ok(Some(id));
        }
        self.registry.class_mut(id).bound = true;
        log::debug!("binding class {}", name);

        if let Some(clinit) = self.registry.class(id).find_direct("<clinit>", "()V") {
            self.run_initializer(clinit)?;
        }
        Ok(Some(id))
    }

    fn run_initializer(&mut self, clinit: Rc<Method>) -> VmResult<()> {
        log::debug!("running <clinit> of {}", clinit.class_name);
        let loader = self.loader_thread;
        let base_depth = self.thread(loader).depth();
        self.push_frame(loader, clinit, true)?;

        match self.run_nested(loader, base_depth) {
            Err(VmError::Throw(exception)) => self.report_uncaught(&exception),
            Err(error) => {
                while self.thread(loader).depth() > base_depth {
                    self.pop_frame(loader)?;
                }
                Err(error)
            }
            Ok(()) => Ok(()),
        }
    }

    /// Resolve a virtual method from `class_name` up the superclass chain
    ///
    /// Every hop goes through [`Vm::load_class`]. The walk stops at the first
    /// class no module defines, and a cyclic chain is an error.
    pub fn get_virtual_method(
        &mut self,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> VmResult<Option<Rc<Method>>> {
        for id in self.module_chain(class_name)? {
            if let Some(method) = self.registry.class(id).find_virtual(name, descriptor) {
                return Ok(Some(method));
            }
        }
        Ok(None)
    }

    /// Resolve a direct method declared by exactly `class_name`
    pub fn get_direct_method(
        &mut self,
        class_name: &str,
        name: &str,
        descriptor: &str,
    ) -> VmResult<Option<Rc<Method>>> {
        match self.load_class(class_name)? {
            Some(id) => Ok(self.registry.class(id).find_direct(name, descriptor)),
            None => Ok(None),
        }
    }

    /// Resolve a static field from `class_name` up the module superclass chain
    pub fn get_static_field(&mut self, class_name: &str, name: &str) -> VmResult<Option<(ClassId, usize)>> {
        for id in self.module_chain(class_name)? {
            if let Some(index) = self.registry.class(id).static_field_index(name) {
                return Ok(Some((id, index)));
            }
        }
        Ok(None)
    }

    /// First class in the superclass chain of `class_name` not defined by a module
    pub fn first_host_ancestor(&mut self, class_name: &str) -> VmResult<String> {
        let chain = self.module_chain(class_name)?;
        Ok(match chain.last() {
            Some(id) => self.registry.class(*id).super_name.clone(),
            None => class_name.to_string(),
        })
    }

    /// Module classes from `class_name` upwards, in order
    pub fn module_chain(&mut self, class_name: &str) -> VmResult<Vec<ClassId>> {
        let mut chain = Vec::new();
        let mut current = class_name.to_string();
        while let Some(id) = self.load_class(&current)? {
            if chain.contains(&id) {
                return Err(VmError::Internal(format!("cyclic superclass chain at {}", current)));
            }
            chain.push(id);
            let super_name = &self.registry.class(id).super_name;
            // a root class without superclass names itself
            if *super_name == current {
                break;
            }
            current = super_name.clone();
        }
        Ok(chain)
    }
}
