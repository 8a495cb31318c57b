//! Virtual machine state
//!
//! The [`Vm`] owns everything a running module touches:
//! - The class registry and the per-descriptor class objects
//! - The thread arena, the live set in registration order, and the wait-sets
//! - The shim answering for host classes
//! - Output sinks and the error hook

use crate::class::{ClassId, Method};
use crate::object::{HostObject, Instance, Object, ObjectRef, Stream};
use crate::registry::ClassRegistry;
use crate::scheduler::StopHandle;
use crate::shim::{Shim, ShimContext, StandardShim};
use crate::sync::WaitSets;
use crate::thread::{Thread, ThreadId, ThreadStatus};
use crate::value::Register;
use crate::{VmError, VmResult};
use dexvm_bytecode::descriptor::{class_descriptor, class_name};
use dexvm_bytecode::DexFile;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::io::Write;
use std::rc::Rc;

/// Name of the internal thread running static initializers
pub const LOADER_THREAD_NAME: &str = "Class Loader";

/// Tunables of a VM instance
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VmOptions {
    /// Instructions per scheduler step for each priority level
    pub instructions_per_priority: usize,

    /// Frames per thread before `StackOverflowError` is thrown
    pub max_stack_depth: usize,

    /// Back-off in milliseconds when every live thread is timed-blocked
    pub idle_sleep_ms: u64,

    /// Stop with [`VmError::Deadlock`] when no thread can make progress
    pub detect_deadlock: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            instructions_per_priority: 20,
            max_stack_depth: 1024,
            idle_sleep_ms: 1,
            detect_deadlock: true,
        }
    }
}

impl VmOptions {
    /// Options with a specific stack depth limit
    pub fn with_max_stack_depth(max_stack_depth: usize) -> Self {
        Self {
            max_stack_depth,
            ..Default::default()
        }
    }

    /// Options that never report deadlocks
    pub fn without_deadlock_detection() -> Self {
        Self {
            detect_deadlock: false,
            ..Default::default()
        }
    }
}

/// Receiver of uncaught exception reports
pub type ErrorHook = Box<dyn FnMut(&str)>;

/// A DEX virtual machine
pub struct Vm {
    pub(crate) registry: ClassRegistry,
    pub(crate) threads: Vec<Thread>,
    /// Started, not yet ended threads in registration order
    pub(crate) live: Vec<ThreadId>,
    pub(crate) wait_sets: WaitSets,
    pub(crate) shim: Rc<dyn Shim>,
    pub(crate) options: VmOptions,
    pub(crate) loader_thread: ThreadId,
    pub(crate) stop: StopHandle,
    pub(crate) finished: bool,
    class_objects: FxHashMap<String, ObjectRef>,
    out: Box<dyn Write>,
    err: Box<dyn Write>,
    error_hook: Option<ErrorHook>,
    unnamed_threads: usize,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}

impl Vm {
    /// Create a VM with default options and the standard shim
    pub fn new() -> Self {
        Self::with_options(VmOptions::default())
    }

    /// Create a VM with the given options and the standard shim
    pub fn with_options(options: VmOptions) -> Self {
        let mut loader = Thread::new(ThreadId(0), LOADER_THREAD_NAME);
        loader.status = ThreadStatus::Running;
        Self {
            registry: ClassRegistry::new(),
            threads: vec![loader],
            live: Vec::new(),
            wait_sets: WaitSets::new(),
            shim: Rc::new(StandardShim::new()),
            options,
            loader_thread: ThreadId(0),
            stop: StopHandle::new(),
            finished: false,
            class_objects: FxHashMap::default(),
            out: Box::new(std::io::stdout()),
            err: Box::new(std::io::stderr()),
            error_hook: None,
            unnamed_threads: 0,
        }
    }

    /// Replace the shim answering for host classes
    pub fn with_shim(mut self, shim: impl Shim + 'static) -> Self {
        self.shim = Rc::new(shim);
        self
    }

    /// Redirect module `System.out` output
    pub fn with_output(mut self, out: impl Write + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    /// Redirect module `System.err` output and default error reports
    pub fn with_error_output(mut self, err: impl Write + 'static) -> Self {
        self.err = Box::new(err);
        self
    }

    /// Install a receiver for uncaught exception reports
    pub fn set_error_hook(&mut self, hook: impl FnMut(&str) + 'static) {
        self.error_hook = Some(Box::new(hook));
    }

    /// Active options
    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    // =========================================================
    // Modules
    // =========================================================

    /// Parse and register a module image
    ///
    /// Returns the number of classes added.
    pub fn load(&mut self, bytes: &[u8]) -> VmResult<usize> {
        let dex = DexFile::parse(bytes)?;
        self.load_module(&dex)
    }

    /// Register the classes of an already parsed module
    pub fn load_module(&mut self, dex: &DexFile) -> VmResult<usize> {
        let added = self.registry.register_module(dex)?;
        log::debug!(
            "loaded module: {} classes, {} strings, {} methods",
            added,
            dex.strings.len(),
            dex.method_ids.len()
        );
        Ok(added)
    }

    /// Class registry
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    // =========================================================
    // Threads and Frames
    // =========================================================

    /// Thread by id
    pub fn thread(&self, id: ThreadId) -> &Thread {
        &self.threads[id.index()]
    }

    /// Mutable thread by id
    pub fn thread_mut(&mut self, id: ThreadId) -> &mut Thread {
        &mut self.threads[id.index()]
    }

    /// Every thread ever created, the class loader thread first
    pub fn threads(&self) -> impl Iterator<Item = &Thread> {
        self.threads.iter()
    }

    /// Started threads that have not ended, in registration order
    pub fn live_threads(&self) -> &[ThreadId] {
        &self.live
    }

    /// Create a thread in the `NotStarted` state
    ///
    /// Unnamed threads are called `Thread-N`, counting from zero.
    pub fn create_thread(&mut self, name: Option<String>) -> ThreadId {
        let name = name.unwrap_or_else(|| {
            let name = format!("Thread-{}", self.unnamed_threads);
            self.unnamed_threads += 1;
            name
        });
        let id = ThreadId(self.threads.len());
        self.threads.push(Thread::new(id, name));
        id
    }

    /// Push a frame for `method` without arguments
    pub fn push_frame(&mut self, thread: ThreadId, method: Rc<Method>, boundary: bool) -> VmResult<()> {
        self.thread_mut(thread).push_frame(method, boundary);
        Ok(())
    }

    /// Pop the top frame, releasing the monitor of a synchronized method
    ///
    /// Returns whether the popped frame was a boundary frame.
    pub fn pop_frame(&mut self, thread: ThreadId) -> VmResult<bool> {
        let (boundary, monitor) = self.thread_mut(thread).pop_frame()?;
        if let Some(monitor) = monitor {
            // a frame that never got its lock has nothing to release
            if self.thread(thread).holds_lock(&monitor) {
                self.release_lock(thread, &monitor)?;
            }
        }
        Ok(boundary)
    }

    /// Push a frame for a call of `method` with its incoming arguments
    ///
    /// Returns `false` when the method is synchronized and its monitor is
    /// held elsewhere; the caller must yield and the frame runs once the
    /// monitor is granted.
    pub fn enter_method(&mut self, thread: ThreadId, method: Rc<Method>, args: &[Register]) -> VmResult<bool> {
        if self.thread(thread).depth() >= self.options.max_stack_depth {
            return Err(self.throw("java/lang/StackOverflowError", None));
        }
        let monitor = if !method.is_synchronized() {
            None
        } else if method.is_instance() {
            let receiver = args.first().map(Register::as_object).transpose()?.flatten();
            Some(receiver.ok_or_else(|| self.throw("java/lang/NullPointerException", None))?)
        } else {
            Some(self.class_object(thread, &class_descriptor(&method.class_name))?)
        };

        let frame = self.thread_mut(thread).push_frame(method, false);
        frame.set_incoming(args)?;
        frame.monitor = monitor.clone();

        match monitor {
            Some(monitor) => Ok(self.acquire_lock(thread, &monitor).is_ok()),
            None => Ok(true),
        }
    }

    /// Run `method` on `thread` to completion before returning
    ///
    /// Host code uses this when it needs a module method's result right
    /// away. The result lands in the return slots of the frame that was on
    /// top, and an uncaught exception comes back as [`VmError::Throw`].
    /// When the method sleeps, waits or blocks on a monitor, the other
    /// threads keep running until it can continue.
    pub fn call_nested(&mut self, thread: ThreadId, method: Rc<Method>, args: &[Register]) -> VmResult<()> {
        let base = self.thread(thread).depth();
        self.enter_method(thread, method, args)?;
        self.thread_mut(thread).frame_mut()?.thread_boundary = true;

        let result = self.run_nested(thread, base);
        if result.is_err() {
            while self.thread(thread).depth() > base {
                self.pop_frame(thread)?;
            }
            let t = self.thread_mut(thread);
            if t.status != ThreadStatus::Ended {
                t.status = ThreadStatus::Running;
            }
            t.monitor_to_resume = None;
        }
        result
    }

    /// Move `thread` to `Ended`, freeing its monitors and joiners
    pub fn end_thread(&mut self, thread: ThreadId) {
        let t = self.thread_mut(thread);
        if t.status == ThreadStatus::Ended {
            return;
        }
        t.status = ThreadStatus::Ended;
        t.wake_up = None;
        t.monitor_to_resume = None;
        let joiners = std::mem::take(&mut t.joined);
        log::debug!("thread {} ended", t.name);

        self.live.retain(|id| *id != thread);
        self.wait_sets.remove(thread);
        self.release_all_locks(thread);
        for joiner in joiners {
            let j = self.thread_mut(joiner);
            if j.status == ThreadStatus::Joining && j.joining == Some(thread) {
                j.joining = None;
                j.status = ThreadStatus::Running;
            }
        }
    }

    // =========================================================
    // Objects
    // =========================================================

    /// New instance of a module class with zeroed fields
    pub fn new_instance(&mut self, class: ClassId) -> VmResult<ObjectRef> {
        let name = self.registry.class(class).name.clone();
        let chain_ids = self.module_chain(&name)?;
        let mut chain = Vec::with_capacity(chain_ids.len());
        let mut templates = Vec::with_capacity(chain_ids.len());
        for id in chain_ids {
            let c = self.registry.class(id);
            chain.push(c.name.clone());
            templates.push((c.name.clone(), c.instance_fields.clone()));
        }
        Ok(ObjectRef::new(Object::Instance(Instance::new(class, chain, templates))))
    }

    /// Module-level exception of a host throwable class
    pub fn throw(&self, class_name: &str, message: Option<&str>) -> VmError {
        let throwable = HostObject::throwable(class_name, message.map(str::to_string));
        VmError::Throw(ObjectRef::new(Object::host(throwable)))
    }

    /// Class object for a type descriptor
    ///
    /// The same object is returned for every request of a descriptor, so it
    /// can serve as the monitor of static synchronized methods.
    pub fn class_object(&mut self, thread: ThreadId, descriptor: &str) -> VmResult<ObjectRef> {
        if let Some(obj) = self.class_objects.get(descriptor) {
            return Ok(obj.clone());
        }
        let shim = Rc::clone(&self.shim);
        let from_shim = {
            let mut ctx = ShimContext::new(self, thread);
            shim.class_getter(&mut ctx, descriptor)?
        };
        let obj = from_shim
            .unwrap_or_else(|| ObjectRef::new(Object::host(HostObject::Class(descriptor.to_string()))));
        self.class_objects.insert(descriptor.to_string(), obj.clone());
        Ok(obj)
    }

    /// Check `obj` against a type descriptor
    pub fn is_instance_of(&mut self, obj: &ObjectRef, type_desc: &str) -> VmResult<bool> {
        if type_desc == "Ljava/lang/Object;" {
            return Ok(true);
        }
        if type_desc.starts_with('[') {
            let Some(array) = obj.as_array() else {
                return Ok(false);
            };
            let actual = array.borrow().descriptor();
            return self.is_assignable(&actual, type_desc);
        }
        self.is_instance_of_class(obj, class_name(type_desc))
    }

    /// Check whether a value of type `actual` can be stored as `target`
    ///
    /// Both are type descriptors. Reference arrays are covariant in their
    /// component type; primitive arrays only match themselves.
    pub fn is_assignable(&mut self, actual: &str, target: &str) -> VmResult<bool> {
        if actual == target {
            return Ok(true);
        }
        let reference = matches!(actual.as_bytes().first(), Some(b'L') | Some(b'['));
        if !reference {
            return Ok(false);
        }
        match (actual.strip_prefix('['), target.strip_prefix('[')) {
            (Some(component), Some(target_component)) => self.is_assignable(component, target_component),
            (Some(_), None) => Ok(matches!(
                target,
                "Ljava/lang/Object;" | "Ljava/lang/Cloneable;" | "Ljava/io/Serializable;"
            )),
            (None, Some(_)) => Ok(false),
            (None, None) if target.starts_with('L') => {
                self.is_subclass_of(class_name(actual), class_name(target))
            }
            (None, None) => Ok(false),
        }
    }

    /// Check `obj` against an internal class name
    ///
    /// Module instances are matched over their module superclass chain and
    /// its interfaces, then over the host hierarchy above the chain.
    pub fn is_instance_of_class(&mut self, obj: &ObjectRef, name: &str) -> VmResult<bool> {
        if name == "java/lang/Object" {
            return Ok(true);
        }
        match &**obj {
            Object::Instance(instance) => {
                let class_name = instance.class_name().to_string();
                self.is_subclass_of(&class_name, name)
            }
            Object::Host(host) => {
                let class_name = host.borrow().class_name().to_string();
                Ok(self.host_is_subclass(&class_name, name))
            }
            Object::Array(_) => Ok(matches!(name, "java/lang/Cloneable" | "java/io/Serializable")),
        }
    }

    /// Check whether class `class_name` is `name` or extends or implements it
    fn is_subclass_of(&mut self, class_name: &str, name: &str) -> VmResult<bool> {
        if name == "java/lang/Object" {
            return Ok(true);
        }
        for id in self.module_chain(class_name)? {
            if self.registry.class(id).name == name || self.implements(id, name) {
                return Ok(true);
            }
        }
        let host_start = self.first_host_ancestor(class_name)?;
        Ok(self.host_is_subclass(&host_start, name))
    }

    /// Check whether module class `id` implements `interface`, directly or
    /// through super-interfaces
    fn implements(&self, id: ClassId, interface: &str) -> bool {
        let mut pending: Vec<String> = self.registry.class(id).interfaces.clone();
        let mut seen: Vec<String> = Vec::new();
        while let Some(current) = pending.pop() {
            if current == interface {
                return true;
            }
            if seen.contains(&current) {
                continue;
            }
            if let Some(iface) = self.registry.get(&current) {
                pending.extend(self.registry.class(iface).interfaces.iter().cloned());
            } else if self.shim.interfaces_of(&current).iter().any(|i| i == interface) {
                return true;
            }
            seen.push(current);
        }
        false
    }

    fn host_is_subclass(&self, start: &str, name: &str) -> bool {
        let mut current = start.to_string();
        loop {
            if current == name || self.shim.interfaces_of(&current).iter().any(|i| i == name) {
                return true;
            }
            match self.shim.superclass_of(&current) {
                Some(parent) if parent != current => current = parent,
                _ => return false,
            }
        }
    }

    // =========================================================
    // Output and Error Reporting
    // =========================================================

    /// Write module output to `System.out` or `System.err`
    pub fn write_stream(&mut self, stream: Stream, text: &str) -> VmResult<()> {
        let sink = match stream {
            Stream::Out => &mut self.out,
            Stream::Err => &mut self.err,
        };
        sink.write_all(text.as_bytes())?;
        sink.flush()?;
        Ok(())
    }

    /// `pkg.Class:message` line of an uncaught exception
    pub fn describe_exception(&self, exception: &ObjectRef) -> String {
        let (class, message) = match &**exception {
            Object::Instance(instance) => {
                let message = instance.parent().and_then(|parent| throwable_message(&parent));
                (instance.class_name().to_string(), message)
            }
            _ => (exception.type_name(), throwable_message(exception)),
        };
        format!(
            "{}:{}",
            class.replace('/', "."),
            message.as_deref().unwrap_or("null")
        )
    }

    /// Route an uncaught exception to the error hook
    pub fn report_uncaught(&mut self, exception: &ObjectRef) -> VmResult<()> {
        let report = self.describe_exception(exception);
        self.report_error(&report)
    }

    /// Route a message to the error hook, or to the error sink by default
    pub fn report_error(&mut self, message: &str) -> VmResult<()> {
        if let Some(hook) = self.error_hook.as_mut() {
            hook(message);
            return Ok(());
        }
        log::warn!("{}", message);
        writeln!(self.err, "{}", message)?;
        self.err.flush()?;
        Ok(())
    }
}

fn throwable_message(obj: &ObjectRef) -> Option<String> {
    match &*obj.host_ref()? {
        HostObject::Throwable { message, .. } => message.clone(),
        _ => None,
    }
}
