//! Tree-walking evaluator for parsed scripts.
//!
//! Scopes form a parent chain of `Rc<Scope>`; closures hold on to the scope
//! they were created in. All code runs with strict-mode semantics: writes
//! to undeclared names and to `const` bindings throw.

use super::ast::*;
use super::builtins;
use super::error::ScriptError;
use super::value::{
    as_index, chars_of, check_array_length, check_string_length, Function, Heap, PropertyMap, Value,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::rc::{Rc, Weak};

/// Deepest script call nesting before a `RangeError` is raised.
pub const MAX_CALL_DEPTH: usize = 3_000;

type EvalResult<T> = Result<T, ScriptError>;

struct Binding {
    value: Value,
    mutable: bool,
    initialized: bool,
}

/// One lexical environment.
pub struct Scope {
    bindings: RefCell<HashMap<Rc<str>, Binding>>,
    parent: Option<Rc<Scope>>,
    /// Function (or global) scopes receive `var` declarations and own `this`.
    this: Option<Value>,
}

impl Scope {
    fn new(parent: Option<Rc<Scope>>, this: Option<Value>) -> Self {
        Self {
            bindings: RefCell::new(HashMap::new()),
            parent,
            this,
        }
    }

    fn is_function_scope(&self) -> bool {
        self.this.is_some()
    }

    fn declare(&self, name: Rc<str>, value: Value, mutable: bool, initialized: bool) {
        self.bindings.borrow_mut().insert(
            name,
            Binding {
                value,
                mutable,
                initialized,
            },
        );
    }

    fn has_own(&self, name: &str) -> bool {
        self.bindings.borrow().contains_key(name)
    }

    /// Complete a hoisted `let`/`const` binding when its declaration runs.
    fn initialize(&self, name: &str, value: Value) {
        if let Some(binding) = self.bindings.borrow_mut().get_mut(name) {
            binding.value = value;
            binding.initialized = true;
        }
    }

    fn lookup(&self, name: &str) -> EvalResult<Value> {
        if let Some(binding) = self.bindings.borrow().get(name) {
            if !binding.initialized {
                return Err(ScriptError::reference(format!(
                    "Cannot access '{}' before initialization",
                    name
                )));
            }
            return Ok(binding.value.clone());
        }
        match &self.parent {
            Some(parent) => parent.lookup(name),
            None => Err(ScriptError::reference(format!("{} is not defined", name))),
        }
    }

    fn is_declared(&self, name: &str) -> bool {
        self.has_own(name) || self.parent.as_ref().is_some_and(|p| p.is_declared(name))
    }

    fn assign(&self, name: &str, value: Value) -> EvalResult<()> {
        if let Some(binding) = self.bindings.borrow_mut().get_mut(name) {
            if !binding.initialized {
                return Err(ScriptError::reference(format!(
                    "Cannot access '{}' before initialization",
                    name
                )));
            }
            if !binding.mutable {
                return Err(ScriptError::type_error("Assignment to constant variable."));
            }
            binding.value = value;
            return Ok(());
        }
        match &self.parent {
            Some(parent) => parent.assign(name, value),
            None => Err(ScriptError::reference(format!("{} is not defined", name))),
        }
    }

    fn this_value(&self) -> Value {
        match (&self.this, &self.parent) {
            (Some(this), _) => this.clone(),
            (None, Some(parent)) => parent.this_value(),
            (None, None) => Value::Undefined,
        }
    }

    fn var_scope(self: &Rc<Self>) -> Rc<Scope> {
        let mut scope = self.clone();
        while !scope.is_function_scope() {
            match &scope.parent {
                Some(parent) => scope = parent.clone(),
                None => break,
            }
        }
        scope
    }

    fn clear(&self) {
        let bindings = mem::take(&mut *self.bindings.borrow_mut());
        drop(bindings);
    }

    /// Empties the scope, handing back the bound values.
    pub(crate) fn take_values(&self) -> Vec<Value> {
        match self.bindings.try_borrow_mut() {
            Ok(mut bindings) => bindings.drain().map(|(_, binding)| binding.value).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Control-flow outcome of executing a statement.
enum Completion {
    Normal,
    Return(Value),
    Break,
    Continue,
}

#[derive(Clone, Copy)]
enum BindMode {
    Declare(DeclKind),
    Param,
    Assign,
}

/// A fresh global environment plus the machinery to run code in it.
pub struct Interpreter {
    global: Rc<Scope>,
    call_depth: usize,
    /// Every scope created, so closure cycles can be broken on drop.
    scopes: Vec<Weak<Scope>>,
    prune_at: usize,
    heap: Rc<Heap>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        // Closures reference the scopes that hold them; clearing bindings
        // breaks those cycles so the environment is actually freed.
        for scope in self.scopes.drain(..).filter_map(|weak| weak.upgrade()) {
            scope.clear();
        }
        self.global.clear();
        self.heap.collect();
    }
}

impl Interpreter {
    pub fn new() -> Self {
        let heap = Heap::new();
        let global = Rc::new(Scope::new(None, Some(Value::Undefined)));
        {
            let _heap = heap.enter();
            builtins::install_globals(&global);
        }
        Self {
            global,
            call_depth: 0,
            scopes: Vec::new(),
            prune_at: 1024,
            heap,
        }
    }

    /// Define a global binding (used by builtin installation).
    pub(crate) fn define_global(scope: &Scope, name: &str, value: Value, mutable: bool) {
        scope.declare(Rc::from(name), value, mutable, true);
    }

    /// Run a program's top-level statements in the global scope.
    pub fn run(&mut self, program: &Program) -> Result<(), ScriptError> {
        let _heap = self.heap.enter();
        let global = self.global.clone();
        self.hoist_vars(&program.body, &global);
        self.hoist_lexical(&program.body, &global);
        match self.exec_statements(&program.body, &global)? {
            Completion::Normal | Completion::Return(_) => Ok(()),
            Completion::Break | Completion::Continue => Err(ScriptError::syntax(
                "Illegal break or continue statement",
                0,
                0,
            )),
        }
    }

    /// Read a global binding, if one exists and is initialized.
    pub fn global_value(&self, name: &str) -> Option<Value> {
        if !self.global.has_own(name) {
            return None;
        }
        self.global.lookup(name).ok()
    }

    /// Call into the script from outside it. Arguments built by the host
    /// join this interpreter's heap so cycles through them are collected.
    pub fn invoke(&mut self, callee: &Value, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        self.heap.adopt(&args);
        let _heap = self.heap.enter();
        self.call(callee, this, args)
    }

    /// Call a function value with an explicit receiver.
    pub fn call(&mut self, callee: &Value, this: Value, args: Vec<Value>) -> EvalResult<Value> {
        let Value::Function(func) = callee else {
            return Err(ScriptError::type_error(format!(
                "{} is not a function",
                callee.display_string()
            )));
        };
        match &**func {
            Function::Native {
                func, bound_this, ..
            } => {
                let receiver = match bound_this {
                    Value::Undefined => this,
                    bound => bound.clone(),
                };
                func(self, &receiver, args)
            }
            Function::Script {
                def,
                scope,
                lexical_this,
            } => {
                if self.call_depth >= MAX_CALL_DEPTH {
                    return Err(ScriptError::range("Maximum call stack size exceeded"));
                }
                self.call_depth += 1;
                let receiver = lexical_this.clone().unwrap_or(this);
                let result = self.call_script(def, scope, receiver, args, callee);
                self.call_depth -= 1;
                result
            }
        }
    }

    fn new_scope(&mut self, parent: &Rc<Scope>, this: Option<Value>) -> Rc<Scope> {
        let scope = Rc::new(Scope::new(Some(parent.clone()), this));
        self.scopes.push(Rc::downgrade(&scope));
        if self.scopes.len() >= self.prune_at {
            self.scopes.retain(|weak| weak.strong_count() > 0);
            self.prune_at = (self.scopes.len() * 2).max(1024);
        }
        scope
    }

    fn call_script(
        &mut self,
        def: &Rc<FunctionDef>,
        closure_scope: &Rc<Scope>,
        this: Value,
        args: Vec<Value>,
        callee: &Value,
    ) -> EvalResult<Value> {
        let this_slot = if def.is_arrow { None } else { Some(this) };
        let scope = self.new_scope(closure_scope, this_slot);

        if !def.is_arrow {
            if let Some(name) = &def.name {
                scope.declare(name.clone(), callee.clone(), true, true);
            }
            scope.declare(Rc::from("arguments"), Value::array(args.clone()), true, true);
        }

        let mut args = args.into_iter();
        for param in &def.params {
            let mut value = args.next().unwrap_or(Value::Undefined);
            if matches!(value, Value::Undefined) {
                if let Some(default) = &param.default {
                    value = self.eval_expr(default, &scope)?;
                }
            }
            self.bind_pattern(&param.target, value, &scope, BindMode::Param)?;
        }
        if let Some(rest) = &def.rest {
            let remaining = Value::array(args.collect());
            self.bind_pattern(rest, remaining, &scope, BindMode::Param)?;
        }

        match &def.body {
            FunctionBody::Expr(expr) => self.eval_expr(expr, &scope),
            FunctionBody::Block(body) => {
                self.hoist_vars(body, &scope);
                self.hoist_lexical(body, &scope);
                match self.exec_statements(body, &scope)? {
                    Completion::Return(value) => Ok(value),
                    _ => Ok(Value::Undefined),
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Hoisting
    // ------------------------------------------------------------------

    fn hoist_vars(&mut self, body: &[Stmt], scope: &Rc<Scope>) {
        let mut names = Vec::new();
        for stmt in body {
            collect_var_names(stmt, &mut names);
        }
        for name in names {
            if !scope.has_own(&name) {
                scope.declare(name, Value::Undefined, true, true);
            }
        }
    }

    fn hoist_lexical(&mut self, body: &[Stmt], scope: &Rc<Scope>) {
        for stmt in body {
            match stmt {
                Stmt::Decl(kind @ (DeclKind::Let | DeclKind::Const), declarators) => {
                    for declarator in declarators {
                        let mut names = Vec::new();
                        pattern_names(&declarator.target, &mut names);
                        for name in names {
                            scope.declare(
                                name,
                                Value::Undefined,
                                *kind == DeclKind::Let,
                                false,
                            );
                        }
                    }
                }
                Stmt::Function(def) => {
                    if let Some(name) = &def.name {
                        let closure = self.make_closure(def, scope);
                        scope.declare(name.clone(), closure, true, true);
                    }
                }
                _ => {}
            }
        }
    }

    fn make_closure(&self, def: &Rc<FunctionDef>, scope: &Rc<Scope>) -> Value {
        let lexical_this = if def.is_arrow {
            Some(scope.this_value())
        } else {
            None
        };
        Value::Function(Rc::new(Function::Script {
            def: def.clone(),
            scope: scope.clone(),
            lexical_this,
        }))
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn exec_statements(&mut self, body: &[Stmt], scope: &Rc<Scope>) -> EvalResult<Completion> {
        for stmt in body {
            match self.exec_stmt(stmt, scope)? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_block(&mut self, body: &[Stmt], scope: &Rc<Scope>) -> EvalResult<Completion> {
        let block_scope = self.new_scope(scope, None);
        self.hoist_lexical(body, &block_scope);
        self.exec_statements(body, &block_scope)
    }

    fn exec_stmt(&mut self, stmt: &Stmt, scope: &Rc<Scope>) -> EvalResult<Completion> {
        match stmt {
            Stmt::Empty | Stmt::Function(_) => Ok(Completion::Normal),
            Stmt::Expr(expr) => {
                self.eval_expr(expr, scope)?;
                Ok(Completion::Normal)
            }
            Stmt::Decl(kind, declarators) => {
                self.exec_declaration(*kind, declarators, scope)?;
                Ok(Completion::Normal)
            }
            Stmt::Return(argument) => {
                let value = match argument {
                    Some(expr) => self.eval_expr(expr, scope)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(value))
            }
            Stmt::If {
                test,
                consequent,
                alternate,
            } => {
                if self.eval_expr(test, scope)?.truthy() {
                    self.exec_stmt(consequent, scope)
                } else if let Some(alternate) = alternate {
                    self.exec_stmt(alternate, scope)
                } else {
                    Ok(Completion::Normal)
                }
            }
            Stmt::Block(body) => self.exec_block(body, scope),
            Stmt::While { test, body } => {
                while self.eval_expr(test, scope)?.truthy() {
                    match self.exec_stmt(body, scope)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::DoWhile { body, test } => {
                loop {
                    match self.exec_stmt(body, scope)? {
                        Completion::Break => break,
                        Completion::Return(value) => return Ok(Completion::Return(value)),
                        Completion::Normal | Completion::Continue => {}
                    }
                    if !self.eval_expr(test, scope)?.truthy() {
                        break;
                    }
                }
                Ok(Completion::Normal)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
            } => self.exec_for(init.as_ref(), test.as_ref(), update.as_ref(), body, scope),
            Stmt::ForEach {
                kind,
                binding,
                iterable,
                body,
            } => self.exec_for_each(*kind, binding, iterable, body, scope),
            Stmt::Break => Ok(Completion::Break),
            Stmt::Continue => Ok(Completion::Continue),
            Stmt::Throw(expr) => {
                let value = self.eval_expr(expr, scope)?;
                Err(ScriptError::Thrown(value))
            }
            Stmt::Try {
                block,
                param,
                handler,
                finalizer,
            } => self.exec_try(block, param.as_ref(), handler.as_deref(), finalizer.as_deref(), scope),
            Stmt::Switch {
                discriminant,
                cases,
            } => self.exec_switch(discriminant, cases, scope),
        }
    }

    fn exec_declaration(
        &mut self,
        kind: DeclKind,
        declarators: &[Declarator],
        scope: &Rc<Scope>,
    ) -> EvalResult<()> {
        for declarator in declarators {
            let value = match &declarator.init {
                Some(init) => self.eval_expr(init, scope)?,
                // `var x;` leaves a hoisted value alone.
                None if kind == DeclKind::Var => continue,
                None => Value::Undefined,
            };
            self.bind_pattern(&declarator.target, value, scope, BindMode::Declare(kind))?;
        }
        Ok(())
    }

    fn exec_for(
        &mut self,
        init: Option<&ForInit>,
        test: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
        scope: &Rc<Scope>,
    ) -> EvalResult<Completion> {
        let loop_scope = self.new_scope(scope, None);
        let mut per_iteration = Vec::new();
        match init {
            Some(ForInit::Decl(kind, declarators)) => {
                if *kind != DeclKind::Var {
                    for declarator in declarators {
                        pattern_names(&declarator.target, &mut per_iteration);
                    }
                    for name in &per_iteration {
                        loop_scope.declare(name.clone(), Value::Undefined, *kind == DeclKind::Let, false);
                    }
                }
                self.exec_declaration(*kind, declarators, &loop_scope)?;
            }
            Some(ForInit::Expr(expr)) => {
                self.eval_expr(expr, &loop_scope)?;
            }
            None => {}
        }

        // `let` bindings are copied into a fresh scope per iteration so
        // closures created in the body capture that iteration's values.
        let mut iteration_scope = self.copy_scope(&loop_scope, &per_iteration);
        loop {
            if let Some(test) = test {
                if !self.eval_expr(test, &iteration_scope)?.truthy() {
                    break;
                }
            }
            match self.exec_stmt(body, &iteration_scope)? {
                Completion::Break => break,
                Completion::Return(value) => return Ok(Completion::Return(value)),
                Completion::Normal | Completion::Continue => {}
            }
            iteration_scope = self.copy_scope(&iteration_scope, &per_iteration);
            if let Some(update) = update {
                self.eval_expr(update, &iteration_scope)?;
            }
        }
        Ok(Completion::Normal)
    }

    fn copy_scope(&mut self, from: &Rc<Scope>, names: &[Rc<str>]) -> Rc<Scope> {
        if names.is_empty() {
            return from.clone();
        }
        let parent = from.parent.clone().unwrap_or_else(|| self.global.clone());
        let next = self.new_scope(&parent, None);
        for name in names {
            let binding = from.bindings.borrow();
            if let Some(binding) = binding.get(name) {
                next.declare(
                    name.clone(),
                    binding.value.clone(),
                    binding.mutable,
                    binding.initialized,
                );
            }
        }
        next
    }

    fn exec_for_each(
        &mut self,
        kind: IterationKind,
        binding: &ForBinding,
        iterable: &Expr,
        body: &Stmt,
        scope: &Rc<Scope>,
    ) -> EvalResult<Completion> {
        let source = self.eval_expr(iterable, scope)?;
        let items: Box<dyn Fn(usize) -> Option<Value>> = match (kind, &source) {
            (IterationKind::Of, Value::Array(items)) => {
                let items = items.clone();
                Box::new(move |i| items.borrow().get(i).cloned())
            }
            (IterationKind::Of, Value::String(text)) => {
                let chars = chars_of(text)?;
                Box::new(move |i| chars.get(i).cloned())
            }
            (IterationKind::Of, other) => {
                return Err(ScriptError::type_error(format!(
                    "{} is not iterable",
                    describe_value(other)
                )))
            }
            (IterationKind::In, Value::Object(map)) => {
                let keys: Vec<Value> = map.borrow().keys().map(|k| Value::String(k.clone())).collect();
                Box::new(move |i| keys.get(i).cloned())
            }
            (IterationKind::In, Value::Array(items)) => {
                let len = items.borrow().len();
                Box::new(move |i| (i < len).then(|| Value::from(i.to_string())))
            }
            (IterationKind::In, Value::String(text)) => {
                let len = text.chars().count();
                Box::new(move |i| (i < len).then(|| Value::from(i.to_string())))
            }
            (IterationKind::In, _) => Box::new(|_| None),
        };

        let mut index = 0;
        while let Some(item) = items(index) {
            index += 1;
            let iteration_scope = self.new_scope(scope, None);
            match binding {
                ForBinding::Decl(decl_kind, pattern) => {
                    let mode = if *decl_kind == DeclKind::Var {
                        BindMode::Declare(DeclKind::Var)
                    } else {
                        BindMode::Param
                    };
                    let mut names = Vec::new();
                    pattern_names(pattern, &mut names);
                    if *decl_kind == DeclKind::Const {
                        for name in names {
                            iteration_scope.declare(name, Value::Undefined, false, false);
                        }
                        self.bind_pattern(pattern, item, &iteration_scope, BindMode::Declare(DeclKind::Const))?;
                    } else {
                        self.bind_pattern(pattern, item, &iteration_scope, mode)?;
                    }
                }
                ForBinding::Target(target) => self.assign_to(target, item, &iteration_scope)?,
            }
            match self.exec_stmt(body, &iteration_scope)? {
                Completion::Break => break,
                Completion::Return(value) => return Ok(Completion::Return(value)),
                Completion::Normal | Completion::Continue => {}
            }
        }
        Ok(Completion::Normal)
    }

    fn exec_try(
        &mut self,
        block: &[Stmt],
        param: Option<&Pattern>,
        handler: Option<&[Stmt]>,
        finalizer: Option<&[Stmt]>,
        scope: &Rc<Scope>,
    ) -> EvalResult<Completion> {
        let mut outcome = self.exec_block(block, scope);
        if let (Some(handler), Err(error)) = (handler, outcome.as_ref()) {
            let caught = error.clone().into_value();
            let catch_scope = self.new_scope(scope, None);
            outcome = match param {
                Some(pattern) => self
                    .bind_pattern(pattern, caught, &catch_scope, BindMode::Param)
                    .and_then(|_| self.exec_block(handler, &catch_scope)),
                None => self.exec_block(handler, &catch_scope),
            };
        }
        if let Some(finalizer) = finalizer {
            match self.exec_block(finalizer, scope)? {
                Completion::Normal => {}
                abrupt => return Ok(abrupt),
            }
        }
        outcome
    }

    fn exec_switch(
        &mut self,
        discriminant: &Expr,
        cases: &[SwitchCase],
        scope: &Rc<Scope>,
    ) -> EvalResult<Completion> {
        let value = self.eval_expr(discriminant, scope)?;
        let switch_scope = self.new_scope(scope, None);
        for case in cases {
            self.hoist_lexical(&case.body, &switch_scope);
        }

        let mut start = None;
        for (index, case) in cases.iter().enumerate() {
            if let Some(test) = &case.test {
                if self.eval_expr(test, &switch_scope)?.strict_equals(&value) {
                    start = Some(index);
                    break;
                }
            }
        }
        let start = start.or_else(|| cases.iter().position(|case| case.test.is_none()));

        if let Some(start) = start {
            for case in &cases[start..] {
                match self.exec_statements(&case.body, &switch_scope)? {
                    Completion::Normal => {}
                    Completion::Break => break,
                    abrupt => return Ok(abrupt),
                }
            }
        }
        Ok(Completion::Normal)
    }

    // ------------------------------------------------------------------
    // Patterns and assignment
    // ------------------------------------------------------------------

    fn bind_pattern(
        &mut self,
        pattern: &Pattern,
        value: Value,
        scope: &Rc<Scope>,
        mode: BindMode,
    ) -> EvalResult<()> {
        match pattern {
            Pattern::Ident(name) => self.bind_name(name, value, scope, mode),
            Pattern::Array { elements, rest } => {
                let items: Vec<Value> = match &value {
                    Value::Array(items) => items.borrow().clone(),
                    Value::String(text) => chars_of(text)?,
                    other => {
                        return Err(ScriptError::type_error(format!(
                            "{} is not iterable",
                            describe_value(other)
                        )))
                    }
                };
                for (index, element) in elements.iter().enumerate() {
                    let Some(element) = element else { continue };
                    let item = items.get(index).cloned().unwrap_or(Value::Undefined);
                    self.bind_element(element, item, scope, mode)?;
                }
                if let Some(rest) = rest {
                    let remaining = items.get(elements.len()..).unwrap_or_default().to_vec();
                    self.bind_pattern(rest, Value::array(remaining), scope, mode)?;
                }
                Ok(())
            }
            Pattern::Object { properties, rest } => {
                if value.is_nullish() {
                    return Err(ScriptError::type_error(format!(
                        "Cannot destructure '{}' as it is {}.",
                        value.to_js_string(),
                        value.to_js_string()
                    )));
                }
                let mut used = Vec::new();
                for (key, element) in properties {
                    let key = self.eval_property_key(key, scope)?;
                    used.push(key.to_js_string());
                    let item = self.get_member(&value, &key)?;
                    self.bind_element(element, item, scope, mode)?;
                }
                if let Some(rest) = rest {
                    let mut remaining = PropertyMap::new();
                    if let Value::Object(map) = &value {
                        for (key, item) in map.borrow().iter() {
                            if !used.iter().any(|u| u.as_str() == key.as_ref()) {
                                remaining.insert(key.clone(), item.clone());
                            }
                        }
                    }
                    self.bind_name(rest, Value::object(remaining), scope, mode)?;
                }
                Ok(())
            }
        }
    }

    fn bind_element(
        &mut self,
        element: &PatternElement,
        mut value: Value,
        scope: &Rc<Scope>,
        mode: BindMode,
    ) -> EvalResult<()> {
        if matches!(value, Value::Undefined) {
            if let Some(default) = &element.default {
                value = self.eval_expr(default, scope)?;
            }
        }
        self.bind_pattern(&element.target, value, scope, mode)
    }

    fn bind_name(
        &mut self,
        name: &Rc<str>,
        value: Value,
        scope: &Rc<Scope>,
        mode: BindMode,
    ) -> EvalResult<()> {
        match mode {
            BindMode::Assign => scope.assign(name, value),
            BindMode::Param => {
                scope.declare(name.clone(), value, true, true);
                Ok(())
            }
            BindMode::Declare(DeclKind::Var) => {
                let target = scope.var_scope();
                if target.has_own(name) {
                    target.initialize(name, value);
                } else {
                    target.declare(name.clone(), value, true, true);
                }
                Ok(())
            }
            BindMode::Declare(kind) => {
                if scope.has_own(name) {
                    scope.initialize(name, value);
                } else {
                    scope.declare(name.clone(), value, kind == DeclKind::Let, true);
                }
                Ok(())
            }
        }
    }

    fn assign_to(&mut self, target: &AssignTarget, value: Value, scope: &Rc<Scope>) -> EvalResult<()> {
        match target {
            AssignTarget::Ident(name) => scope.assign(name, value),
            AssignTarget::Member { object, property } => {
                let object = self.eval_expr(object, scope)?;
                let key = self.eval_property_key(property, scope)?;
                self.set_member(&object, &key, value)
            }
            AssignTarget::Pattern(pattern) => self.bind_pattern(pattern, value, scope, BindMode::Assign),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn eval_property_key(&mut self, key: &PropertyKey, scope: &Rc<Scope>) -> EvalResult<Value> {
        match key {
            PropertyKey::Static(name) => Ok(Value::String(name.clone())),
            PropertyKey::Computed(expr) => self.eval_expr(expr, scope),
        }
    }

    pub(crate) fn eval_expr(&mut self, expr: &Expr, scope: &Rc<Scope>) -> EvalResult<Value> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Ident(name) => scope.lookup(name),
            Expr::This => Ok(scope.this_value()),
            Expr::Array(elements) => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    match element {
                        ArrayElement::Item(expr) => items.push(self.eval_expr(expr, scope)?),
                        ArrayElement::Spread(expr) => {
                            let spread = self.eval_expr(expr, scope)?;
                            items.extend(self.spread_items(&spread)?);
                            check_array_length(items.len())?;
                        }
                        ArrayElement::Hole => items.push(Value::Undefined),
                    }
                }
                Ok(Value::array(items))
            }
            Expr::Object(members) => {
                let mut props = PropertyMap::new();
                for member in members {
                    match member {
                        ObjectMember::Property(key, value) => {
                            let key = self.eval_property_key(key, scope)?.to_js_string();
                            let value = self.eval_expr(value, scope)?;
                            props.insert(key.as_str(), value);
                        }
                        ObjectMember::Spread(expr) => match &self.eval_expr(expr, scope)? {
                            Value::Object(map) => {
                                for (key, value) in map.borrow().iter() {
                                    props.insert(key.clone(), value.clone());
                                }
                            }
                            Value::Array(items) => {
                                for (index, value) in items.borrow().iter().enumerate() {
                                    props.insert(index.to_string().as_str(), value.clone());
                                }
                            }
                            _ => {}
                        },
                    }
                }
                Ok(Value::object(props))
            }
            Expr::Function(def) => Ok(self.make_closure(def, scope)),
            Expr::Unary(op, operand) => self.eval_unary(*op, operand, scope),
            Expr::Update {
                increment,
                prefix,
                target,
            } => {
                let old = self.read_target(target, scope)?.to_number();
                let new = if *increment { old + 1.0 } else { old - 1.0 };
                self.write_target(target, Value::Number(new), scope)?;
                Ok(Value::Number(if *prefix { new } else { old }))
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval_expr(lhs, scope)?;
                let rhs = self.eval_expr(rhs, scope)?;
                binary_op(*op, &lhs, &rhs)
            }
            Expr::Logical(op, lhs, rhs) => {
                let lhs = self.eval_expr(lhs, scope)?;
                let short_circuit = match op {
                    LogicalOp::And => !lhs.truthy(),
                    LogicalOp::Or => lhs.truthy(),
                    LogicalOp::Nullish => !lhs.is_nullish(),
                };
                if short_circuit {
                    Ok(lhs)
                } else {
                    self.eval_expr(rhs, scope)
                }
            }
            Expr::Conditional(test, consequent, alternate) => {
                if self.eval_expr(test, scope)?.truthy() {
                    self.eval_expr(consequent, scope)
                } else {
                    self.eval_expr(alternate, scope)
                }
            }
            Expr::Assign { op, target, value } => {
                let result = match op {
                    None => self.eval_expr(value, scope)?,
                    Some(op) => {
                        let current = self.read_target(target, scope)?;
                        let rhs = self.eval_expr(value, scope)?;
                        binary_op(*op, &current, &rhs)?
                    }
                };
                self.write_target(target, result.clone(), scope)?;
                Ok(result)
            }
            Expr::Member { .. } | Expr::Call { .. } | Expr::New { .. } | Expr::OptionalChain(_) => {
                Ok(self.eval_chain(expr, scope)?.unwrap_or(Value::Undefined))
            }
            Expr::Sequence(items) => {
                let mut last = Value::Undefined;
                for item in items {
                    last = self.eval_expr(item, scope)?;
                }
                Ok(last)
            }
        }
    }

    /// Evaluate a member/call chain; `None` means an optional link
    /// short-circuited.
    fn eval_chain(&mut self, expr: &Expr, scope: &Rc<Scope>) -> EvalResult<Option<Value>> {
        match expr {
            Expr::OptionalChain(inner) => self.eval_chain(inner, scope),
            Expr::Member {
                object,
                property,
                optional,
            } => {
                let Some(object) = self.eval_chain(object, scope)? else {
                    return Ok(None);
                };
                if *optional && object.is_nullish() {
                    return Ok(None);
                }
                let key = self.eval_property_key(property, scope)?;
                self.get_member(&object, &key).map(Some)
            }
            Expr::Call {
                callee,
                args,
                optional,
            } => {
                let (function, this) = match &**callee {
                    Expr::Member {
                        object: object_expr,
                        property,
                        optional: member_optional,
                    } => {
                        let Some(object) = self.eval_chain(object_expr, scope)? else {
                            return Ok(None);
                        };
                        if *member_optional && object.is_nullish() {
                            return Ok(None);
                        }
                        let key = self.eval_property_key(property, scope)?;
                        let function = self.get_member(&object, &key)?;
                        if !*optional && !function.is_callable() {
                            return Err(ScriptError::type_error(format!(
                                "{}.{} is not a function",
                                describe_expr(object_expr),
                                key.to_js_string()
                            )));
                        }
                        (function, object)
                    }
                    other => {
                        let Some(function) = self.eval_chain(other, scope)? else {
                            return Ok(None);
                        };
                        if !*optional && !function.is_callable() {
                            return Err(ScriptError::type_error(format!(
                                "{} is not a function",
                                describe_expr(other)
                            )));
                        }
                        (function, Value::Undefined)
                    }
                };
                if *optional && function.is_nullish() {
                    return Ok(None);
                }
                let args = self.eval_arguments(args, scope)?;
                self.call(&function, this, args).map(Some)
            }
            Expr::New { callee, args } => {
                let constructor = self.eval_expr(callee, scope)?;
                let args = self.eval_arguments(args, scope)?;
                match &constructor {
                    Value::Function(func) if matches!(**func, Function::Native { .. }) => {
                        self.call(&constructor, Value::Undefined, args).map(Some)
                    }
                    _ => Err(ScriptError::type_error(format!(
                        "{} is not a supported constructor",
                        describe_expr(callee)
                    ))),
                }
            }
            other => self.eval_expr(other, scope).map(Some),
        }
    }

    fn eval_arguments(&mut self, args: &[Argument], scope: &Rc<Scope>) -> EvalResult<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Argument::Item(expr) => values.push(self.eval_expr(expr, scope)?),
                Argument::Spread(expr) => {
                    let spread = self.eval_expr(expr, scope)?;
                    values.extend(self.spread_items(&spread)?);
                }
            }
        }
        Ok(values)
    }

    fn spread_items(&self, value: &Value) -> EvalResult<Vec<Value>> {
        match value {
            Value::Array(items) => Ok(items.borrow().clone()),
            Value::String(text) => chars_of(text),
            other => Err(ScriptError::type_error(format!(
                "{} is not iterable",
                describe_value(other)
            ))),
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, operand: &Expr, scope: &Rc<Scope>) -> EvalResult<Value> {
        if op == UnaryOp::Typeof {
            // `typeof undeclared` is "undefined", not a ReferenceError.
            if let Expr::Ident(name) = operand {
                if !scope.is_declared(name) {
                    return Ok(Value::from("undefined"));
                }
            }
        }
        let value = self.eval_expr(operand, scope)?;
        Ok(match op {
            UnaryOp::Not => Value::Bool(!value.truthy()),
            UnaryOp::Neg => Value::Number(-value.to_number()),
            UnaryOp::Plus => Value::Number(value.to_number()),
            UnaryOp::BitNot => Value::Number(f64::from(!to_int32(value.to_number()))),
            UnaryOp::Typeof => Value::from(value.type_of()),
        })
    }

    fn read_target(&mut self, target: &AssignTarget, scope: &Rc<Scope>) -> EvalResult<Value> {
        match target {
            AssignTarget::Ident(name) => scope.lookup(name),
            AssignTarget::Member { object, property } => {
                let object = self.eval_expr(object, scope)?;
                let key = self.eval_property_key(property, scope)?;
                self.get_member(&object, &key)
            }
            AssignTarget::Pattern(_) => Err(ScriptError::syntax(
                "Invalid left-hand side in assignment",
                0,
                0,
            )),
        }
    }

    fn write_target(&mut self, target: &AssignTarget, value: Value, scope: &Rc<Scope>) -> EvalResult<()> {
        self.assign_to(target, value, scope)
    }

    // ------------------------------------------------------------------
    // Property access
    // ------------------------------------------------------------------

    /// `object[key]` for every value kind.
    pub fn get_member(&mut self, object: &Value, key: &Value) -> EvalResult<Value> {
        let index = match key {
            Value::Number(n) => as_index(*n),
            Value::String(s) => s.parse::<usize>().ok().filter(|i| i.to_string() == s.as_ref()),
            _ => None,
        };
        let name = key.to_js_string();

        match object {
            Value::Undefined | Value::Null => Err(ScriptError::type_error(format!(
                "Cannot read properties of {} (reading '{}')",
                object.to_js_string(),
                name
            ))),
            Value::Array(items) => {
                if let Some(index) = index {
                    return Ok(items.borrow().get(index).cloned().unwrap_or(Value::Undefined));
                }
                if name == "length" {
                    return Ok(Value::from(items.borrow().len()));
                }
                Ok(builtins::array_method(&name)
                    .map(|(name, func)| Value::bound_native(name, func, object.clone()))
                    .unwrap_or(Value::Undefined))
            }
            Value::String(text) => {
                if let Some(index) = index {
                    return Ok(text
                        .chars()
                        .nth(index)
                        .map(|c| Value::from(c.to_string()))
                        .unwrap_or(Value::Undefined));
                }
                if name == "length" {
                    return Ok(Value::from(text.chars().count()));
                }
                Ok(builtins::string_method(&name)
                    .map(|(name, func)| Value::bound_native(name, func, object.clone()))
                    .unwrap_or(Value::Undefined))
            }
            Value::Object(map) => {
                if let Some(value) = map.borrow().get(&name) {
                    return Ok(value.clone());
                }
                Ok(builtins::object_method(&name)
                    .map(|(name, func)| Value::bound_native(name, func, object.clone()))
                    .unwrap_or(Value::Undefined))
            }
            Value::Number(_) => Ok(builtins::number_method(&name)
                .map(|(name, func)| Value::bound_native(name, func, object.clone()))
                .unwrap_or(Value::Undefined)),
            Value::Bool(_) => Ok(match name.as_str() {
                "toString" => Value::bound_native("toString", builtins::to_string_method, object.clone()),
                _ => Value::Undefined,
            }),
            Value::Function(func) => {
                if name == "name" {
                    return Ok(Value::from(func.name()));
                }
                if let Function::Native { name: owner, .. } = &**func {
                    if let Some(value) = builtins::static_member(owner, &name) {
                        return Ok(value);
                    }
                }
                Ok(builtins::function_method(&name)
                    .map(|(name, func)| Value::bound_native(name, func, object.clone()))
                    .unwrap_or(Value::Undefined))
            }
        }
    }

    /// `object[key] = value`.
    pub fn set_member(&mut self, object: &Value, key: &Value, value: Value) -> EvalResult<()> {
        let name = key.to_js_string();
        match object {
            Value::Undefined | Value::Null => Err(ScriptError::type_error(format!(
                "Cannot set properties of {} (setting '{}')",
                object.to_js_string(),
                name
            ))),
            Value::Array(items) => {
                let index = match key {
                    Value::Number(n) => as_index(*n),
                    _ => name.parse::<usize>().ok().filter(|i| i.to_string() == name),
                };
                let mut items = items.borrow_mut();
                if let Some(index) = index {
                    if index >= items.len() {
                        check_array_length(index + 1)?;
                        items.resize(index + 1, Value::Undefined);
                    }
                    items[index] = value;
                    return Ok(());
                }
                if name == "length" {
                    let len = value.to_number();
                    let Some(len) = as_index(len) else {
                        return Err(ScriptError::range("Invalid array length"));
                    };
                    check_array_length(len)?;
                    items.resize(len, Value::Undefined);
                    return Ok(());
                }
                Err(ScriptError::type_error(format!(
                    "Cannot create property '{}' on array",
                    name
                )))
            }
            Value::Object(map) => {
                map.borrow_mut().insert(name.as_str(), value);
                Ok(())
            }
            other => Err(ScriptError::type_error(format!(
                "Cannot create property '{}' on {} '{}'",
                name,
                other.type_of(),
                other.to_js_string()
            ))),
        }
    }
}

// ----------------------------------------------------------------------
// Operators
// ----------------------------------------------------------------------

pub(crate) fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    (n.trunc().rem_euclid(4_294_967_296.0) as u32) as i32
}

fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}

fn to_primitive(value: &Value) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) | Value::Function(_) => Value::from(value.to_js_string()),
        other => other.clone(),
    }
}

fn binary_op(op: BinaryOp, lhs: &Value, rhs: &Value) -> EvalResult<Value> {
    let value = match op {
        BinaryOp::Add => {
            let (lhs, rhs) = (to_primitive(lhs), to_primitive(rhs));
            if matches!(lhs, Value::String(_)) || matches!(rhs, Value::String(_)) {
                let (lhs, rhs) = (lhs.to_js_string(), rhs.to_js_string());
                check_string_length(lhs.len() + rhs.len())?;
                Value::from(lhs + &rhs)
            } else {
                Value::Number(lhs.to_number() + rhs.to_number())
            }
        }
        BinaryOp::Sub => Value::Number(lhs.to_number() - rhs.to_number()),
        BinaryOp::Mul => Value::Number(lhs.to_number() * rhs.to_number()),
        BinaryOp::Div => Value::Number(lhs.to_number() / rhs.to_number()),
        BinaryOp::Rem => Value::Number(lhs.to_number() % rhs.to_number()),
        BinaryOp::Exp => {
            let (base, exponent) = (lhs.to_number(), rhs.to_number());
            if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
                Value::Number(f64::NAN)
            } else {
                Value::Number(base.powf(exponent))
            }
        }
        BinaryOp::Lt => compare(lhs, rhs, |o| o == std::cmp::Ordering::Less),
        BinaryOp::LtEq => compare(lhs, rhs, |o| o != std::cmp::Ordering::Greater),
        BinaryOp::Gt => compare(lhs, rhs, |o| o == std::cmp::Ordering::Greater),
        BinaryOp::GtEq => compare(lhs, rhs, |o| o != std::cmp::Ordering::Less),
        BinaryOp::Eq => Value::Bool(lhs.loose_equals(rhs)),
        BinaryOp::NotEq => Value::Bool(!lhs.loose_equals(rhs)),
        BinaryOp::StrictEq => Value::Bool(lhs.strict_equals(rhs)),
        BinaryOp::StrictNotEq => Value::Bool(!lhs.strict_equals(rhs)),
        BinaryOp::BitAnd => Value::Number(f64::from(to_int32(lhs.to_number()) & to_int32(rhs.to_number()))),
        BinaryOp::BitOr => Value::Number(f64::from(to_int32(lhs.to_number()) | to_int32(rhs.to_number()))),
        BinaryOp::BitXor => Value::Number(f64::from(to_int32(lhs.to_number()) ^ to_int32(rhs.to_number()))),
        BinaryOp::Shl => Value::Number(f64::from(
            to_int32(lhs.to_number()).wrapping_shl(to_uint32(rhs.to_number()) & 31),
        )),
        BinaryOp::Shr => Value::Number(f64::from(
            to_int32(lhs.to_number()).wrapping_shr(to_uint32(rhs.to_number()) & 31),
        )),
        BinaryOp::UShr => Value::Number(f64::from(
            to_uint32(lhs.to_number()).wrapping_shr(to_uint32(rhs.to_number()) & 31),
        )),
        BinaryOp::In => {
            let key = lhs.to_js_string();
            match rhs {
                Value::Object(map) => Value::Bool(map.borrow().contains_key(&key)),
                Value::Array(items) => Value::Bool(
                    key == "length"
                        || key
                            .parse::<usize>()
                            .map(|i| i < items.borrow().len())
                            .unwrap_or(false),
                ),
                other => {
                    return Err(ScriptError::type_error(format!(
                        "Cannot use 'in' operator to search for '{}' in {}",
                        key,
                        other.to_js_string()
                    )))
                }
            }
        }
    };
    Ok(value)
}

fn compare(lhs: &Value, rhs: &Value, accept: impl Fn(std::cmp::Ordering) -> bool) -> Value {
    let (lhs, rhs) = (to_primitive(lhs), to_primitive(rhs));
    if let (Value::String(a), Value::String(b)) = (&lhs, &rhs) {
        return Value::Bool(accept(a.cmp(b)));
    }
    match lhs.to_number().partial_cmp(&rhs.to_number()) {
        Some(ordering) => Value::Bool(accept(ordering)),
        None => Value::Bool(false),
    }
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

fn collect_var_names(stmt: &Stmt, names: &mut Vec<Rc<str>>) {
    match stmt {
        Stmt::Decl(DeclKind::Var, declarators) => {
            for declarator in declarators {
                pattern_names(&declarator.target, names);
            }
        }
        Stmt::If {
            consequent,
            alternate,
            ..
        } => {
            collect_var_names(consequent, names);
            if let Some(alternate) = alternate {
                collect_var_names(alternate, names);
            }
        }
        Stmt::Block(body) => body.iter().for_each(|s| collect_var_names(s, names)),
        Stmt::While { body, .. } | Stmt::DoWhile { body, .. } => collect_var_names(body, names),
        Stmt::For { init, body, .. } => {
            if let Some(ForInit::Decl(DeclKind::Var, declarators)) = init {
                for declarator in declarators {
                    pattern_names(&declarator.target, names);
                }
            }
            collect_var_names(body, names);
        }
        Stmt::ForEach { binding, body, .. } => {
            if let ForBinding::Decl(DeclKind::Var, pattern) = binding {
                pattern_names(pattern, names);
            }
            collect_var_names(body, names);
        }
        Stmt::Try {
            block,
            handler,
            finalizer,
            ..
        } => {
            for body in [Some(block), handler.as_ref(), finalizer.as_ref()].into_iter().flatten() {
                body.iter().for_each(|s| collect_var_names(s, names));
            }
        }
        Stmt::Switch { cases, .. } => {
            for case in cases {
                case.body.iter().for_each(|s| collect_var_names(s, names));
            }
        }
        _ => {}
    }
}

fn pattern_names(pattern: &Pattern, names: &mut Vec<Rc<str>>) {
    match pattern {
        Pattern::Ident(name) => names.push(name.clone()),
        Pattern::Array { elements, rest } => {
            for element in elements.iter().flatten() {
                pattern_names(&element.target, names);
            }
            if let Some(rest) = rest {
                pattern_names(rest, names);
            }
        }
        Pattern::Object { properties, rest } => {
            for (_, element) in properties {
                pattern_names(&element.target, names);
            }
            if let Some(rest) = rest {
                names.push(rest.clone());
            }
        }
    }
}

/// Short source-like rendering of an expression for error messages.
fn describe_expr(expr: &Expr) -> String {
    match expr {
        Expr::Ident(name) => name.to_string(),
        Expr::This => "this".to_string(),
        Expr::Member {
            object, property, ..
        } => match property {
            PropertyKey::Static(name) => format!("{}.{}", describe_expr(object), name),
            PropertyKey::Computed(_) => format!("{}[...]", describe_expr(object)),
        },
        Expr::Call { callee, .. } => format!("{}(...)", describe_expr(callee)),
        Expr::OptionalChain(inner) => describe_expr(inner),
        _ => "expression".to_string(),
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Object(_) => "object".to_string(),
        other => other.to_js_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::parser::parse;

    fn eval(source: &str) -> Result<Value, ScriptError> {
        let program = parse(&format!("{}\nfunction __result__() {{ return main(); }}", source))?;
        let mut interpreter = Interpreter::new();
        interpreter.run(&program)?;
        let entry = interpreter
            .global_value("__result__")
            .expect("entry point is defined");
        interpreter.call(&entry, Value::Undefined, vec![])
    }

    fn eval_number(source: &str) -> f64 {
        match eval(source) {
            Ok(Value::Number(n)) => n,
            other => panic!("expected a number, got {:?}", other),
        }
    }

    fn eval_string(source: &str) -> String {
        match eval(source) {
            Ok(value) => value.to_js_string(),
            Err(e) => panic!("evaluation failed: {}", e),
        }
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(eval_number("function main() { return 1 + 2 * 3 - 4 / 2; }"), 5.0);
        assert_eq!(eval_number("function main() { return 2 ** 3 ** 2; }"), 512.0);
        assert_eq!(eval_number("function main() { return -7 % 3; }"), -1.0);
    }

    #[test]
    fn test_string_concatenation() {
        assert_eq!(eval_string("function main() { return 'a' + 1 + 2; }"), "a12");
        assert_eq!(eval_string("function main() { return 1 + 2 + 'a'; }"), "3a");
        assert_eq!(eval_string("function main() { return [1, 2] + ''; }"), "1,2");
    }

    #[test]
    fn test_recursion() {
        assert_eq!(
            eval_number(
                "function fib(n) { return n < 2 ? n : fib(n - 1) + fib(n - 2); }\n\
                 function main() { return fib(15); }"
            ),
            610.0
        );
    }

    #[test]
    fn test_closures_capture_per_iteration_bindings() {
        assert_eq!(
            eval_string(
                "function main() {\n\
                   const fns = [];\n\
                   for (let i = 0; i < 3; i++) fns.push(() => i);\n\
                   return fns.map(f => f()).join(',');\n\
                 }"
            ),
            "0,1,2"
        );
    }

    #[test]
    fn test_var_hoisting_and_function_scope() {
        assert_eq!(
            eval_string(
                "function main() {\n\
                   if (true) { var x = 5; }\n\
                   return typeof y + ':' + x;\n\
                 }"
            ),
            "undefined:5"
        );
    }

    #[test]
    fn test_strict_mode_undeclared_assignment_throws() {
        let err = eval("function main() { undeclared = 1; return 0; }").unwrap_err();
        assert!(matches!(err, ScriptError::Reference(_)));
    }

    #[test]
    fn test_const_reassignment_throws() {
        let err = eval("function main() { const a = 1; a = 2; return a; }").unwrap_err();
        assert!(matches!(err, ScriptError::Type(_)));
    }

    #[test]
    fn test_temporal_dead_zone() {
        let err = eval("function main() { const v = w; let w = 1; return v; }").unwrap_err();
        assert!(matches!(err, ScriptError::Reference(_)));
    }

    #[test]
    fn test_destructuring() {
        assert_eq!(
            eval_number(
                "function main() {\n\
                   const { a, b: [c, d = 4], ...rest } = { a: 1, b: [2], e: 5 };\n\
                   let [x, y] = [10, 20]; [x, y] = [y, x];\n\
                   return a + c + d + rest.e + x - y;\n\
                 }"
            ),
            22.0
        );
    }

    #[test]
    fn test_try_catch_finally() {
        assert_eq!(
            eval_string(
                "function main() {\n\
                   let log = '';\n\
                   try { null.x; } catch (e) { log += e.name; } finally { log += '!'; }\n\
                   try { throw { code: 7 }; } catch ({ code }) { log += code; }\n\
                   return log;\n\
                 }"
            ),
            "TypeError!7"
        );
    }

    #[test]
    fn test_switch_fallthrough() {
        assert_eq!(
            eval_string(
                "function classify(n) {\n\
                   let out = '';\n\
                   switch (n) { case 1: out += 'one'; case 2: out += 'two'; break; default: out = 'many'; }\n\
                   return out;\n\
                 }\n\
                 function main() { return [classify(1), classify(2), classify(9)].join('|'); }"
            ),
            "onetwo|two|many"
        );
    }

    #[test]
    fn test_loops() {
        assert_eq!(
            eval_number(
                "function main() {\n\
                   let total = 0;\n\
                   for (const v of [1, 2, 3]) { if (v === 2) continue; total += v; }\n\
                   for (const k in { a: 1, bb: 2 }) total += k.length;\n\
                   let i = 0; while (true) { if (++i > 4) break; }\n\
                   do { total += 100; } while (false);\n\
                   return total + i;\n\
                 }"
            ),
            112.0
        );
    }

    #[test]
    fn test_optional_chaining_and_nullish() {
        assert_eq!(
            eval_string(
                "function main() {\n\
                   const o = { a: { b: 1 } };\n\
                   return [o?.a?.b, o.x?.y.z, o.missing ?? 'fallback', o.f?.()].join(',');\n\
                 }"
            ),
            "1,,fallback,"
        );
    }

    #[test]
    fn test_runaway_recursion_is_range_error() {
        // The default test thread stack is too small for the full call depth.
        let handle = std::thread::Builder::new()
            .stack_size(256 * 1024 * 1024)
            .spawn(|| {
                let err = eval("function f(n) { return f(n + 1); }\nfunction main() { return f(0); }")
                    .unwrap_err();
                matches!(err, ScriptError::Range(_))
            })
            .unwrap();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn test_reading_property_of_undefined() {
        let err = eval("function main() { let o; return o.x; }").unwrap_err();
        assert!(err.to_string().contains("Cannot read properties of undefined"));
    }

    #[test]
    fn test_bitwise_operators() {
        assert_eq!(eval_number("function main() { return (5 & 3) | (1 << 4); }"), 17.0);
        assert_eq!(eval_number("function main() { return -1 >>> 28; }"), 15.0);
        assert_eq!(eval_number("function main() { return ~5; }"), -6.0);
    }
}
