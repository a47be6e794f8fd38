//! Tree-walking evaluator for judge scripts.
//!
//! Each [`Interpreter`] owns a fresh scope. The only host capabilities are
//! reading files and testing for their existence inside the task workspace.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::mem::size_of;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use super::parser::{BinOp, CmpOp, Expr, Program, Stmt};
use super::{ScriptError, ScriptLimits};

/// Runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    List(Vec<Value>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "str",
            Value::List(_) => "list",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
        }
    }

    /// Quoted representation, as shown inside lists.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(Value::repr).collect();
                write!(f, "[{}]", parts.join(", "))
            }
        }
    }
}

/// Maximum nesting of list values.
pub const MAX_VALUE_DEPTH: usize = 32;

/// Approximate memory held by a value and how deeply its lists nest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footprint {
    pub bytes: usize,
    pub depth: usize,
}

/// Measures a value without recursion.
pub fn measure(value: &Value) -> Footprint {
    let mut footprint = Footprint { bytes: 0, depth: 0 };
    let mut pending = vec![(value, 1)];
    while let Some((value, depth)) = pending.pop() {
        footprint.bytes += size_of::<Value>();
        footprint.depth = footprint.depth.max(depth);
        match value {
            Value::Str(s) => footprint.bytes += s.len(),
            Value::List(items) => pending.extend(items.iter().map(|item| (item, depth + 1))),
            _ => {}
        }
    }
    footprint
}

/// Evaluates a parsed program against one scope.
pub struct Interpreter {
    scope: HashMap<String, Value>,
    /// Footprints of names the script assigned; host bindings are not counted.
    assigned: HashMap<String, usize>,
    scope_bytes: usize,
    /// Bytes of intermediate values kept alive while an expression evaluates.
    held_bytes: usize,
    workspace: PathBuf,
    limits: ScriptLimits,
    deadline: Option<Instant>,
    steps: u64,
    line: usize,
}

type EvalResult = Result<Value, ScriptError>;

impl Interpreter {
    pub fn new(workspace: PathBuf, limits: ScriptLimits) -> Self {
        Self {
            scope: HashMap::new(),
            assigned: HashMap::new(),
            scope_bytes: 0,
            held_bytes: 0,
            workspace,
            limits,
            deadline: None,
            steps: 0,
            line: 0,
        }
    }

    /// Stops evaluation once `deadline` passes.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Binds a name in the script scope.
    pub fn bind(&mut self, name: &str, value: Value) {
        self.scope.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.scope.get(name)
    }

    /// Number of evaluation steps consumed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn run(&mut self, program: &Program) -> Result<(), ScriptError> {
        self.exec_block(&program.statements)
    }

    fn exec_block(&mut self, statements: &[Stmt]) -> Result<(), ScriptError> {
        for stmt in statements {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<(), ScriptError> {
        self.line = stmt.line();
        self.step()?;

        match stmt {
            Stmt::Assign { target, value, .. } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
            }
            Stmt::Expr { expr, .. } => {
                self.eval(expr)?;
            }
            Stmt::Pass { .. } => {}
            Stmt::Raise { value, line } => {
                let message = match value {
                    Some(expr) => self.eval(expr)?.to_string(),
                    None => "exception raised".to_string(),
                };
                return Err(ScriptError::Raised {
                    line: *line,
                    message,
                });
            }
            Stmt::Assert {
                condition,
                message,
                line,
            } => {
                if !self.eval(condition)?.is_truthy() {
                    let message = match message {
                        Some(expr) => format!("AssertionError: {}", self.eval(expr)?),
                        None => "AssertionError".to_string(),
                    };
                    return Err(ScriptError::Raised {
                        line: *line,
                        message,
                    });
                }
            }
            Stmt::If {
                branches,
                otherwise,
                ..
            } => {
                for (condition, body) in branches {
                    if self.eval(condition)?.is_truthy() {
                        return self.exec_block(body);
                    }
                }
                self.exec_block(otherwise)?;
            }
        }
        Ok(())
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<(), ScriptError> {
        let bytes = measure(&value).bytes;
        let previous = self.assigned.get(name).copied().unwrap_or(0);
        let total = self.scope_bytes.saturating_sub(previous) + bytes;
        if total + self.held_bytes > self.limits.max_value_bytes {
            return Err(self.value_too_large());
        }
        self.scope_bytes = total;
        self.assigned.insert(name.to_string(), bytes);
        self.scope.insert(name.to_string(), value);
        Ok(())
    }

    /// Counts a temporary against the value budget until [`Self::release`].
    fn hold(&mut self, value: &Value) -> Result<usize, ScriptError> {
        let bytes = measure(value).bytes;
        self.held_bytes += bytes;
        if self.held_bytes + self.scope_bytes > self.limits.max_value_bytes {
            return Err(self.value_too_large());
        }
        Ok(bytes)
    }

    fn release(&mut self, bytes: usize) {
        self.held_bytes = self.held_bytes.saturating_sub(bytes);
    }

    fn step(&mut self) -> Result<(), ScriptError> {
        self.steps += 1;
        if self.steps > self.limits.max_steps {
            return Err(ScriptError::StepLimit(self.limits.max_steps));
        }
        if self.steps % 1024 == 0 {
            if let Some(deadline) = self.deadline {
                if Instant::now() >= deadline {
                    return Err(ScriptError::DeadlineExceeded);
                }
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> EvalResult {
        self.step()?;

        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self
                .scope
                .get(name)
                .cloned()
                .ok_or_else(|| self.runtime(format!("name '{name}' is not defined"))),
            Expr::List(items) => {
                let values = self.eval_all(items)?;
                let list = Value::List(values);
                let footprint = measure(&list);
                if footprint.depth > MAX_VALUE_DEPTH {
                    return Err(self.runtime(format!(
                        "lists nested deeper than {MAX_VALUE_DEPTH} levels"
                    )));
                }
                if footprint.bytes > self.limits.max_value_bytes {
                    return Err(self.value_too_large());
                }
                Ok(list)
            }
            Expr::Neg(operand) => match self.eval(operand)? {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| self.runtime("integer overflow")),
                other => Err(self.runtime(format!(
                    "bad operand type for unary -: '{}'",
                    other.type_name()
                ))),
            },
            Expr::Not(operand) => Ok(Value::Bool(!self.eval(operand)?.is_truthy())),
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let held = self.hold(&left)?;
                let right = self.eval(right)?;
                self.release(held);
                self.binary(*op, left, right)
            }
            Expr::Compare { first, rest } => {
                let mut left = self.eval(first)?;
                for (op, next) in rest {
                    let held = self.hold(&left)?;
                    let right = self.eval(next)?;
                    self.release(held);
                    if !self.compare(*op, &left, &right)? {
                        return Ok(Value::Bool(false));
                    }
                    left = right;
                }
                Ok(Value::Bool(true))
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                if self.eval(condition)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let held = self.hold(&target)?;
                let index = self.eval(index)?;
                self.release(held);
                self.index(target, index)
            }
            Expr::Slice { target, start, end } => {
                let target = self.eval(target)?;
                let held = self.hold(&target)?;
                let start = self.optional_int(start.as_deref())?;
                let end = self.optional_int(end.as_deref())?;
                self.release(held);
                self.slice(target, start, end)
            }
            Expr::Call { function, args } => {
                let args = self.eval_all(args)?;
                self.call(function, args)
            }
            Expr::Method {
                receiver,
                name,
                args,
            } => {
                let receiver = self.eval(receiver)?;
                let held = self.hold(&receiver)?;
                let args = self.eval_all(args)?;
                self.release(held);
                self.method(receiver, name, args)
            }
        }
    }

    /// Evaluates expressions in order, holding each result until all are done.
    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Value>, ScriptError> {
        let mut values = Vec::with_capacity(exprs.len());
        let mut held = 0;
        for expr in exprs {
            let value = self.eval(expr)?;
            held += self.hold(&value)?;
            values.push(value);
        }
        self.release(held);
        Ok(values)
    }

    fn optional_int(&mut self, expr: Option<&Expr>) -> Result<Option<i64>, ScriptError> {
        match expr {
            None => Ok(None),
            Some(expr) => match self.eval(expr)? {
                Value::Int(i) => Ok(Some(i)),
                Value::None => Ok(None),
                other => Err(self.runtime(format!(
                    "slice indices must be integers, not '{}'",
                    other.type_name()
                ))),
            },
        }
    }

    fn binary(&self, op: BinOp, left: Value, right: Value) -> EvalResult {
        use Value::{Int, List, Str};

        let overflow = || self.runtime("integer overflow");
        match (op, left, right) {
            (BinOp::Add, Int(a), Int(b)) => a.checked_add(b).map(Int).ok_or_else(overflow),
            (BinOp::Add, Str(a), Str(b)) => {
                if a.len() + b.len() > self.limits.max_string_bytes {
                    return Err(self.string_too_large());
                }
                Ok(Str(a + &b))
            }
            (BinOp::Add, List(mut a), List(b)) => {
                let bytes = size_of::<Value>() + items_bytes(&a) + items_bytes(&b);
                if bytes > self.limits.max_value_bytes {
                    return Err(self.value_too_large());
                }
                a.extend(b);
                Ok(List(a))
            }
            (BinOp::Sub, Int(a), Int(b)) => a.checked_sub(b).map(Int).ok_or_else(overflow),
            (BinOp::Mul, Int(a), Int(b)) => a.checked_mul(b).map(Int).ok_or_else(overflow),
            (BinOp::Mul, Str(s), Int(n)) | (BinOp::Mul, Int(n), Str(s)) => {
                let count = usize::try_from(n).unwrap_or(0);
                if s.len().saturating_mul(count) > self.limits.max_string_bytes {
                    return Err(self.string_too_large());
                }
                Ok(Str(s.repeat(count)))
            }
            (BinOp::FloorDiv, Int(a), Int(b)) => {
                if b == 0 {
                    return Err(self.runtime("integer division or modulo by zero"));
                }
                let quotient = a.checked_div(b).ok_or_else(overflow)?;
                let adjust = a % b != 0 && ((a < 0) != (b < 0));
                Ok(Int(if adjust { quotient - 1 } else { quotient }))
            }
            (BinOp::Mod, Int(a), Int(b)) => {
                if b == 0 {
                    return Err(self.runtime("integer division or modulo by zero"));
                }
                let remainder = a.checked_rem(b).ok_or_else(overflow)?;
                let adjust = remainder != 0 && ((remainder < 0) != (b < 0));
                Ok(Int(if adjust { remainder + b } else { remainder }))
            }
            (op, left, right) => Err(self.runtime(format!(
                "unsupported operand type(s) for {}: '{}' and '{}'",
                op_symbol(op),
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    fn compare(&self, op: CmpOp, left: &Value, right: &Value) -> Result<bool, ScriptError> {
        match op {
            CmpOp::Eq => Ok(left == right),
            CmpOp::Ne => Ok(left != right),
            CmpOp::In => self.contains(right, left),
            CmpOp::NotIn => Ok(!self.contains(right, left)?),
            CmpOp::Lt => Ok(self.order(left, right, "<")? == Ordering::Less),
            CmpOp::Le => Ok(self.order(left, right, "<=")? != Ordering::Greater),
            CmpOp::Gt => Ok(self.order(left, right, ">")? == Ordering::Greater),
            CmpOp::Ge => Ok(self.order(left, right, ">=")? != Ordering::Less),
        }
    }

    fn contains(&self, container: &Value, item: &Value) -> Result<bool, ScriptError> {
        match (container, item) {
            (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
            (Value::Str(_), other) => Err(self.runtime(format!(
                "'in <string>' requires string as left operand, not {}",
                other.type_name()
            ))),
            (Value::List(items), item) => Ok(items.contains(item)),
            (other, _) => Err(self.runtime(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    fn order(&self, left: &Value, right: &Value, symbol: &str) -> Result<Ordering, ScriptError> {
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Ok(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    if x != y {
                        return self.order(x, y, symbol);
                    }
                }
                Ok(a.len().cmp(&b.len()))
            }
            _ => Err(self.runtime(format!(
                "'{symbol}' not supported between instances of '{}' and '{}'",
                left.type_name(),
                right.type_name()
            ))),
        }
    }

    fn index(&self, target: Value, index: Value) -> EvalResult {
        let Value::Int(i) = index else {
            return Err(self.runtime(format!(
                "indices must be integers, not '{}'",
                index.type_name()
            )));
        };
        match target {
            Value::List(items) => {
                let position = self.resolve_index(i, items.len())?;
                Ok(items[position].clone())
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let position = self.resolve_index(i, chars.len())?;
                Ok(Value::Str(chars[position].to_string()))
            }
            other => Err(self.runtime(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    fn resolve_index(&self, index: i64, len: usize) -> Result<usize, ScriptError> {
        let len = len as i64;
        let position = if index < 0 { index + len } else { index };
        if position < 0 || position >= len {
            return Err(self.runtime("index out of range"));
        }
        Ok(position as usize)
    }

    fn slice(&self, target: Value, start: Option<i64>, end: Option<i64>) -> EvalResult {
        let bounds = |len: usize| {
            let len = len as i64;
            let clamp = |i: i64| {
                let i = if i < 0 { i + len } else { i };
                i.clamp(0, len) as usize
            };
            let start = start.map(clamp).unwrap_or(0);
            let end = end.map(clamp).unwrap_or(len as usize);
            (start, end.max(start))
        };
        match target {
            Value::List(items) => {
                let (start, end) = bounds(items.len());
                Ok(Value::List(items[start..end].to_vec()))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let (start, end) = bounds(chars.len());
                Ok(Value::Str(chars[start..end].iter().collect()))
            }
            other => Err(self.runtime(format!(
                "'{}' object is not subscriptable",
                other.type_name()
            ))),
        }
    }

    fn call(&self, function: &str, args: Vec<Value>) -> EvalResult {
        match function {
            "len" => {
                let [value] = self.arity::<1>(function, args)?;
                match value {
                    Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                    Value::List(items) => Ok(Value::Int(items.len() as i64)),
                    other => Err(self.runtime(format!(
                        "object of type '{}' has no len()",
                        other.type_name()
                    ))),
                }
            }
            "str" => match self.arity::<1>(function, args)? {
                [Value::Str(s)] => Ok(Value::Str(s)),
                [value] => {
                    // A rendering never exceeds three times the footprint.
                    if measure(&value).bytes.saturating_mul(3) > self.limits.max_string_bytes {
                        return Err(self.string_too_large());
                    }
                    self.string(value.to_string())
                }
            },
            "int" => {
                let [value] = self.arity::<1>(function, args)?;
                match value {
                    Value::Int(i) => Ok(Value::Int(i)),
                    Value::Bool(b) => Ok(Value::Int(i64::from(b))),
                    Value::Str(s) => s.trim().replace('_', "").parse::<i64>().map(Value::Int).map_err(|_| {
                        self.runtime(format!("invalid literal for int(): {}", Value::Str(s.clone()).repr()))
                    }),
                    other => Err(self.runtime(format!(
                        "int() argument must be a string or a number, not '{}'",
                        other.type_name()
                    ))),
                }
            }
            "read_file" => {
                let [path] = self.arity::<1>(function, args)?;
                let path = self.expect_str(path, "read_file() argument")?;
                self.read_file(&path)
            }
            "file_exists" => {
                let [path] = self.arity::<1>(function, args)?;
                let path = self.expect_str(path, "file_exists() argument")?;
                Ok(Value::Bool(self.file_exists(&path)?))
            }
            other => Err(self.runtime(format!("name '{other}' is not defined"))),
        }
    }

    fn method(&self, receiver: Value, name: &str, args: Vec<Value>) -> EvalResult {
        let s = match receiver {
            Value::Str(s) => s,
            other => {
                return Err(self.runtime(format!(
                    "'{}' object has no attribute '{name}'",
                    other.type_name()
                )))
            }
        };

        match name {
            "strip" => match args.as_slice() {
                [] => Ok(Value::Str(s.trim().to_string())),
                [Value::Str(chars)] => {
                    let set: Vec<char> = chars.chars().collect();
                    Ok(Value::Str(s.trim_matches(set.as_slice()).to_string()))
                }
                _ => Err(self.runtime("strip() takes at most one string argument")),
            },
            "lower" => {
                self.arity::<0>(name, args)?;
                self.string(s.to_lowercase())
            }
            "upper" => {
                self.arity::<0>(name, args)?;
                self.string(s.to_uppercase())
            }
            "startswith" => {
                let [prefix] = self.arity::<1>(name, args)?;
                let prefix = self.expect_str(prefix, "startswith() argument")?;
                Ok(Value::Bool(s.starts_with(prefix.as_str())))
            }
            "endswith" => {
                let [suffix] = self.arity::<1>(name, args)?;
                let suffix = self.expect_str(suffix, "endswith() argument")?;
                Ok(Value::Bool(s.ends_with(suffix.as_str())))
            }
            "split" => match args.as_slice() {
                [] | [Value::None] => {
                    self.check_parts(s.split_whitespace().count(), s.len())?;
                    Ok(string_list(s.split_whitespace()))
                }
                [Value::Str(sep)] if sep.is_empty() => Err(self.runtime("empty separator")),
                [Value::Str(sep)] => {
                    self.check_parts(s.split(sep.as_str()).count(), s.len())?;
                    Ok(string_list(s.split(sep.as_str())))
                }
                _ => Err(self.runtime("split() takes at most one string argument")),
            },
            "splitlines" => {
                self.arity::<0>(name, args)?;
                self.check_parts(s.lines().count(), s.len())?;
                Ok(string_list(s.lines()))
            }
            "count" => {
                let [needle] = self.arity::<1>(name, args)?;
                let needle = self.expect_str(needle, "count() argument")?;
                let count = if needle.is_empty() {
                    s.chars().count() + 1
                } else {
                    s.matches(needle.as_str()).count()
                };
                Ok(Value::Int(count as i64))
            }
            "replace" => {
                let [old, new] = self.arity::<2>(name, args)?;
                let old = self.expect_str(old, "replace() argument")?;
                let new = self.expect_str(new, "replace() argument")?;
                let (matches, removed) = if old.is_empty() {
                    (s.chars().count() + 1, 0)
                } else {
                    let matches = s.matches(old.as_str()).count();
                    (matches, matches * old.len())
                };
                let len = matches
                    .checked_mul(new.len())
                    .and_then(|added| (s.len() - removed).checked_add(added));
                match len {
                    Some(len) if len <= self.limits.max_string_bytes => {
                        Ok(Value::Str(s.replace(old.as_str(), &new)))
                    }
                    _ => Err(self.string_too_large()),
                }
            }
            other => Err(self.runtime(format!("'str' object has no attribute '{other}'"))),
        }
    }

    fn read_file(&self, path: &str) -> EvalResult {
        let resolved = self.resolve_path(path)?;
        let canonical = self
            .confine(&resolved)
            .ok_or_else(|| self.runtime(format!("No such file: '{path}'")))?;
        let metadata =
            fs::metadata(&canonical).map_err(|e| self.runtime(format!("cannot read '{path}': {e}")))?;
        if metadata.len() > self.limits.max_string_bytes as u64 {
            return Err(self.string_too_large());
        }
        let bytes =
            fs::read(&canonical).map_err(|e| self.runtime(format!("cannot read '{path}': {e}")))?;
        Ok(Value::Str(String::from_utf8_lossy(&bytes).into_owned()))
    }

    fn file_exists(&self, path: &str) -> Result<bool, ScriptError> {
        let resolved = self.resolve_path(path)?;
        Ok(self.confine(&resolved).is_some())
    }

    /// Rejects absolute paths and parent references before touching the disk.
    fn resolve_path(&self, path: &str) -> Result<PathBuf, ScriptError> {
        let relative = Path::new(path);
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if path.is_empty() || escapes {
            return Err(self.runtime(format!("access outside the workspace is denied: '{path}'")));
        }
        Ok(self.workspace.join(relative))
    }

    /// Returns the canonical path if it exists and stays inside the workspace
    /// after following symlinks.
    fn confine(&self, path: &Path) -> Option<PathBuf> {
        let root = self.workspace.canonicalize().ok()?;
        let canonical = path.canonicalize().ok()?;
        canonical.starts_with(&root).then_some(canonical)
    }

    fn arity<const N: usize>(&self, name: &str, args: Vec<Value>) -> Result<[Value; N], ScriptError> {
        let count = args.len();
        args.try_into().map_err(|_| {
            self.runtime(format!("{name}() takes {N} argument(s) ({count} given)"))
        })
    }

    fn expect_str(&self, value: Value, what: &str) -> Result<String, ScriptError> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(self.runtime(format!("{what} must be str, not '{}'", other.type_name()))),
        }
    }

    fn string(&self, s: String) -> EvalResult {
        if s.len() > self.limits.max_string_bytes {
            return Err(self.string_too_large());
        }
        Ok(Value::Str(s))
    }

    /// Checks the footprint of a string split into `parts` before building it.
    fn check_parts(&self, parts: usize, len: usize) -> Result<(), ScriptError> {
        let bytes = parts
            .saturating_add(1)
            .saturating_mul(size_of::<Value>())
            .saturating_add(len);
        if bytes > self.limits.max_value_bytes {
            return Err(self.value_too_large());
        }
        Ok(())
    }

    fn value_too_large(&self) -> ScriptError {
        self.runtime(format!(
            "script values exceed the {} byte limit",
            self.limits.max_value_bytes
        ))
    }

    fn string_too_large(&self) -> ScriptError {
        self.runtime(format!(
            "string exceeds the {} byte limit",
            self.limits.max_string_bytes
        ))
    }

    fn runtime(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Runtime {
            line: self.line,
            message: message.into(),
        }
    }
}

fn items_bytes(items: &[Value]) -> usize {
    items.iter().map(|item| measure(item).bytes).sum()
}

fn string_list<'a>(parts: impl Iterator<Item = &'a str>) -> Value {
    Value::List(parts.map(|p| Value::Str(p.to_string())).collect())
}

fn op_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::FloorDiv => "//",
        BinOp::Mod => "%",
    }
}
