//! IR generator
//!
//! Walks a type-checked AST and emits QBE intermediate language text. The
//! traversal is read-only; the generator trusts the invariants the type
//! checker established (every identifier declared before use, every
//! expression type resolved) and treats violations as fatal internal
//! inconsistencies, not user-facing diagnostics.

use std::collections::{HashMap, VecDeque};
use std::fmt::Write;

use log::debug;

use crate::frontend::ast::*;
use crate::middle::sigil::{BlockLabel, FuncScopeTemp, GlobalName, NamedTemp, UserLabel};
use crate::types::Type;

/// Every expression leaves its value in a fresh temporary whose number is
/// recorded here, to propagate to the consuming instruction.
///
/// Each value is written exactly once and read exactly once; reading an
/// empty recorder or overwriting an unread value is a contract violation
/// between the emission rules.
#[derive(Debug, Default)]
struct ValueRecorder {
    num: Option<usize>,
}

impl ValueRecorder {
    fn record(&mut self, num: usize) {
        debug_assert!(self.num.is_none(), "temporary recorded twice without a read");
        self.num = Some(num);
    }

    fn take(&mut self) -> usize {
        self.num
            .take()
            .expect("no temporary recorded for the previous expression")
    }
}

/// One `case`/`default` arm of a switch body, in textual order.
#[derive(Debug, Clone, Copy)]
struct SwitchArm {
    /// `None` marks the `default` arm.
    value: Option<i32>,
    label: BlockLabel,
}

/// QBE IR generator.
///
/// Holds all per-compilation mutable state; construct a fresh generator for
/// every compilation unit so temporary and label numbers restart at 1.
pub struct QbeIrGen {
    output: String,
    /// Next temporary number; the first handed out is 1.
    next_temp: usize,
    /// Next label number; the first handed out is 1.
    next_label: usize,
    /// Storage slot (the temporary holding the stack address) of each
    /// declared identifier in the current function.
    slots: HashMap<String, usize>,
    recorder: ValueRecorder,
    /// Innermost-last `break` targets (loop and switch `end` labels).
    break_targets: Vec<BlockLabel>,
    /// Innermost-last `continue` targets (loop re-entry labels).
    continue_targets: Vec<BlockLabel>,
    /// Pending arm labels of each enclosing switch body, in textual order.
    case_queues: Vec<VecDeque<BlockLabel>>,
    /// Whether the last emitted instruction leaves the current block.
    terminated: bool,
}

impl QbeIrGen {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            next_temp: 1,
            next_label: 1,
            slots: HashMap::new(),
            recorder: ValueRecorder::default(),
            break_targets: Vec::new(),
            continue_targets: Vec::new(),
            case_queues: Vec::new(),
            terminated: false,
        }
    }

    /// Generate IR for a whole program.
    pub fn generate(mut self, program: &Program) -> String {
        for func in &program.funcs {
            self.gen_func_def(func);
        }
        debug!(
            "emitted {} function(s), {} temporaries, {} labels",
            program.funcs.len(),
            self.next_temp - 1,
            self.next_label - 1
        );
        self.output
    }

    // ==================== Emission helpers ====================

    fn push_line(&mut self, line: std::fmt::Arguments) {
        writeln!(self.output, "{}", line).expect("writing to a string cannot fail");
        self.terminated = false;
    }

    fn emit_jmp(&mut self, target: impl std::fmt::Display) {
        self.push_line(format_args!("jmp {}", target));
        self.terminated = true;
    }

    fn emit_ret(&mut self, value: impl std::fmt::Display) {
        self.push_line(format_args!("ret {}", value));
        self.terminated = true;
    }

    /// Returns the next temporary number and increments it by 1.
    fn fresh_temp(&mut self) -> usize {
        let num = self.next_temp;
        self.next_temp += 1;
        num
    }

    /// Returns the next label number and increments it by 1.
    fn fresh_label(&mut self) -> usize {
        let num = self.next_label;
        self.next_label += 1;
        num
    }

    fn slot_of(&self, id: &str) -> usize {
        *self
            .slots
            .get(id)
            .expect("identifier without a storage slot reached the generator")
    }

    // ==================== Functions ====================

    fn gen_func_def(&mut self, func: &FuncDef) {
        // Slots are per function; temporary and label numbers are not.
        self.slots.clear();

        let mut signature = String::new();
        for (i, param) in func.params.iter().enumerate() {
            if i > 0 {
                signature.push_str(", ");
            }
            let _ = write!(
                signature,
                "{} {}",
                base_type(&param.ty),
                NamedTemp(&param.id)
            );
        }
        self.push_line(format_args!(
            "export function w {}({}) {{",
            GlobalName(&func.id),
            signature
        ));
        self.push_line(format_args!("@start"));

        // Give every parameter an ordinary stack slot so the body can treat
        // it like any other declared variable.
        for param in &func.params {
            let slot = self.fresh_temp();
            self.gen_alloc(slot, &param.ty);
            self.push_line(format_args!(
                "store{} {}, {}",
                base_type(&param.ty),
                NamedTemp(&param.id),
                FuncScopeTemp(slot)
            ));
            self.slots.insert(param.id.clone(), slot);
        }

        self.gen_compound_stmt(&func.body);

        // Falling off the end of a function still has to leave the block.
        if !self.terminated {
            self.emit_ret(0);
        }
        self.push_line(format_args!("}}"));
    }

    fn gen_alloc(&mut self, slot: usize, ty: &Type) {
        let (alloc, size) = match base_type(ty) {
            "l" => ("alloc8", 8),
            _ => ("alloc4", 4),
        };
        self.push_line(format_args!(
            "{} =l {} {}",
            FuncScopeTemp(slot),
            alloc,
            size
        ));
    }

    // ==================== Statements ====================

    fn gen_compound_stmt(&mut self, block: &CompoundStmt) {
        for item in &block.items {
            match item {
                BlockItem::Decl(decl) => self.gen_decl(decl),
                BlockItem::Stmt(stmt) => self.gen_stmt(stmt),
            }
        }
    }

    fn gen_decl(&mut self, decl: &Decl) {
        let slot = self.fresh_temp();
        self.gen_alloc(slot, &decl.ty);

        if let Some(init) = &decl.init {
            self.gen_expr(init);
            let value = self.recorder.take();
            self.push_line(format_args!(
                "store{} {}, {}",
                base_type(&decl.ty),
                FuncScopeTemp(value),
                FuncScopeTemp(slot)
            ));
        }
        // Remember the slot so later uses of the id know where to load from.
        self.slots.insert(decl.id.clone(), slot);
    }

    fn gen_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Compound(block) => self.gen_compound_stmt(block),
            Stmt::Expr(expr) => {
                if !expr.is_null() {
                    self.gen_expr(expr);
                    // Statement context discards the value.
                    self.recorder.take();
                }
            }
            Stmt::If {
                predicate,
                then,
                or_else,
            } => self.gen_if_stmt(predicate, then, or_else.as_deref()),
            Stmt::While {
                predicate,
                body,
                is_do_while,
            } => self.gen_while_stmt(predicate, body, *is_do_while),
            Stmt::For {
                init,
                predicate,
                step,
                body,
            } => self.gen_for_stmt(init, predicate, step, body),
            Stmt::Return(expr) => {
                self.gen_expr(expr);
                let value = self.recorder.take();
                self.emit_ret(FuncScopeTemp(value));
            }
            Stmt::Break => {
                let target = *self
                    .break_targets
                    .last()
                    .expect("break without an enclosing loop or switch");
                self.emit_jmp(target);
            }
            Stmt::Continue => {
                let target = *self
                    .continue_targets
                    .last()
                    .expect("continue without an enclosing loop");
                self.emit_jmp(target);
            }
            Stmt::Goto { label } => {
                self.emit_jmp(UserLabel(label));
            }
            Stmt::Labeled { label, stmt } => {
                self.push_line(format_args!("{}", UserLabel(label)));
                self.gen_stmt(stmt);
            }
            Stmt::Switch { ctrl, body } => self.gen_switch_stmt(ctrl, body),
            Stmt::Case { stmt, .. } | Stmt::Default { stmt } => {
                // The dispatch chain pre-assigned a label to this arm; emit
                // it here so earlier arms fall through in textual order.
                let label = self
                    .case_queues
                    .last_mut()
                    .and_then(|queue| queue.pop_front())
                    .expect("case label outside of a switch body");
                self.push_line(format_args!("{}", label));
                self.gen_stmt(stmt);
            }
        }
    }

    /// Jumps to `then` if the predicate is non-zero, else to `else` (or
    /// `end` when no else branch exists). The `then` branch always ends in a
    /// jump past the else branch, so both paths converge on `end` with no
    /// dangling branches regardless of returns inside either branch.
    fn gen_if_stmt(&mut self, predicate: &Expr, then: &Stmt, or_else: Option<&Stmt>) {
        self.gen_expr(predicate);
        let pred = self.recorder.take();

        let number = self.fresh_label();
        let then_label = BlockLabel::new("then", number);
        let else_label = BlockLabel::new("else", number);
        let end_label = BlockLabel::new("end", number);

        let false_target = if or_else.is_some() { else_label } else { end_label };
        self.push_line(format_args!(
            "jnz {}, {}, {}",
            FuncScopeTemp(pred),
            then_label,
            false_target
        ));

        self.push_line(format_args!("{}", then_label));
        self.gen_stmt(then);
        if let Some(or_else) = or_else {
            self.emit_jmp(end_label);
            self.push_line(format_args!("{}", else_label));
            self.gen_stmt(or_else);
        }
        self.push_line(format_args!("{}", end_label));
    }

    /// A while statement's predicate is evaluated before the body, a
    /// do-while statement's after it; the do-while form needs only the one
    /// conditional jump at the bottom.
    fn gen_while_stmt(&mut self, predicate: &Expr, body: &Stmt, is_do_while: bool) {
        let number = self.fresh_label();
        let pred_label = BlockLabel::new("pred", number);
        let body_label = BlockLabel::new("loop_body", number);
        let end_label = BlockLabel::new("end", number);

        self.break_targets.push(end_label);
        self.continue_targets.push(pred_label);

        if !is_do_while {
            self.push_line(format_args!("{}", pred_label));
            self.gen_expr(predicate);
            let pred = self.recorder.take();
            self.push_line(format_args!(
                "jnz {}, {}, {}",
                FuncScopeTemp(pred),
                body_label,
                end_label
            ));
            self.push_line(format_args!("{}", body_label));
            self.gen_stmt(body);
            self.emit_jmp(pred_label);
        } else {
            self.push_line(format_args!("{}", body_label));
            self.gen_stmt(body);
            self.push_line(format_args!("{}", pred_label));
            self.gen_expr(predicate);
            let pred = self.recorder.take();
            self.push_line(format_args!(
                "jnz {}, {}, {}",
                FuncScopeTemp(pred),
                body_label,
                end_label
            ));
        }

        self.push_line(format_args!("{}", end_label));
        self.continue_targets.pop();
        self.break_targets.pop();
    }

    /// The loop initialization runs once; the predicate gates each
    /// iteration (a null predicate means no conditional branch at all — the
    /// loop only exits through `break`); the step runs after the body, under
    /// its own label so `continue` re-enters there.
    fn gen_for_stmt(&mut self, init: &LoopInit, predicate: &Expr, step: &Expr, body: &Stmt) {
        let number = self.fresh_label();
        let pred_label = BlockLabel::new("pred", number);
        let body_label = BlockLabel::new("loop_body", number);
        let step_label = BlockLabel::new("step", number);
        let end_label = BlockLabel::new("end", number);

        match init {
            LoopInit::Decl(decl) => self.gen_decl(decl),
            LoopInit::Expr(expr) => {
                if !expr.is_null() {
                    self.gen_expr(expr);
                    self.recorder.take();
                }
            }
        }

        self.push_line(format_args!("{}", pred_label));
        if !predicate.is_null() {
            self.gen_expr(predicate);
            let pred = self.recorder.take();
            self.push_line(format_args!(
                "jnz {}, {}, {}",
                FuncScopeTemp(pred),
                body_label,
                end_label
            ));
        }
        self.push_line(format_args!("{}", body_label));

        self.break_targets.push(end_label);
        self.continue_targets.push(step_label);
        self.gen_stmt(body);
        self.continue_targets.pop();
        self.break_targets.pop();

        self.push_line(format_args!("{}", step_label));
        if !step.is_null() {
            self.gen_expr(step);
            self.recorder.take();
        }
        self.emit_jmp(pred_label);
        self.push_line(format_args!("{}", end_label));
    }

    /// The control expression is evaluated once, then compared against each
    /// case constant in textual order; the first match jumps to that arm's
    /// label, and a miss falls back to `default` (or `end`). The body is
    /// emitted as written, so adjacent arms fall through like in C.
    fn gen_switch_stmt(&mut self, ctrl: &Expr, body: &Stmt) {
        self.gen_expr(ctrl);
        let ctrl_num = self.recorder.take();

        let end_label = BlockLabel::new("end", self.fresh_label());

        let mut values = Vec::new();
        collect_switch_arms(body, &mut values);
        let arms: Vec<SwitchArm> = values
            .into_iter()
            .map(|value| SwitchArm {
                value,
                label: BlockLabel::new(
                    if value.is_some() { "case" } else { "default" },
                    self.fresh_label(),
                ),
            })
            .collect();

        let fallback = arms
            .iter()
            .find(|arm| arm.value.is_none())
            .map(|arm| arm.label)
            .unwrap_or(end_label);

        let value_arms: Vec<&SwitchArm> = arms.iter().filter(|arm| arm.value.is_some()).collect();
        for (i, arm) in value_arms.iter().enumerate() {
            let test = self.fresh_temp();
            self.push_line(format_args!(
                "{} =w ceqw {}, {}",
                FuncScopeTemp(test),
                FuncScopeTemp(ctrl_num),
                arm.value.expect("value arms hold a constant")
            ));
            if i + 1 == value_arms.len() {
                self.push_line(format_args!(
                    "jnz {}, {}, {}",
                    FuncScopeTemp(test),
                    arm.label,
                    fallback
                ));
                self.terminated = true;
            } else {
                let next_test = BlockLabel::new("case_test", self.fresh_label());
                self.push_line(format_args!(
                    "jnz {}, {}, {}",
                    FuncScopeTemp(test),
                    arm.label,
                    next_test
                ));
                self.push_line(format_args!("{}", next_test));
            }
        }
        if value_arms.is_empty() {
            self.emit_jmp(fallback);
        }

        self.break_targets.push(end_label);
        self.case_queues
            .push(arms.iter().map(|arm| arm.label).collect());
        self.gen_stmt(body);
        let leftover = self.case_queues.pop().expect("switch arm queue vanished");
        debug_assert!(leftover.is_empty(), "unemitted switch arm labels");
        self.break_targets.pop();

        self.push_line(format_args!("{}", end_label));
    }

    // ==================== Expressions ====================

    fn gen_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            // The null placeholder emits nothing and records nothing;
            // every consumer checks for it before reading the recorder.
            ExprKind::Null => {}
            ExprKind::Id(id) => {
                // A bare function name evaluates to its address.
                if expr.ty.is_func() {
                    let num = self.fresh_temp();
                    self.push_line(format_args!(
                        "{} =l copy {}",
                        FuncScopeTemp(num),
                        GlobalName(id)
                    ));
                    self.recorder.record(num);
                    return;
                }
                // The slot plays the role of a pointer; the value has to be
                // loaded into a register before use.
                let slot = self.slot_of(id);
                let num = self.fresh_temp();
                self.push_line(format_args!(
                    "{} ={} load{} {}",
                    FuncScopeTemp(num),
                    base_type(&expr.ty),
                    base_type(&expr.ty),
                    FuncScopeTemp(slot)
                ));
                self.recorder.record(num);
            }
            ExprKind::IntConst(value) => {
                let num = self.fresh_temp();
                self.push_line(format_args!("{} =w copy {}", FuncScopeTemp(num), value));
                self.recorder.record(num);
            }
            ExprKind::Arg(inner) => {
                // The wrapper contributes nothing; the argument's value
                // stays recorded for the call to consume.
                self.gen_expr(inner);
            }
            ExprKind::FuncCall { callee, args } => self.gen_func_call(expr, callee, args),
            ExprKind::Unary { op, operand } => self.gen_unary_expr(expr, *op, operand),
            ExprKind::Binary { op, lhs, rhs } => {
                // Left to right, each operand consumed immediately so the
                // recorder is never clobbered.
                self.gen_expr(lhs);
                let left = self.recorder.take();
                self.gen_expr(rhs);
                let right = self.recorder.take();
                let num = self.fresh_temp();
                self.push_line(format_args!(
                    "{} =w {} {}, {}",
                    FuncScopeTemp(num),
                    binary_op_mnemonic(*op),
                    FuncScopeTemp(left),
                    FuncScopeTemp(right)
                ));
                self.recorder.record(num);
            }
            ExprKind::Assign { id, rhs } => {
                self.gen_expr(rhs);
                let value = self.recorder.take();
                let slot = self.slot_of(id);
                self.push_line(format_args!(
                    "store{} {}, {}",
                    base_type(&expr.ty),
                    FuncScopeTemp(value),
                    FuncScopeTemp(slot)
                ));
                // Assignment yields its right-hand value, so it can be used
                // inside a larger expression.
                self.recorder.record(value);
            }
        }
    }

    fn gen_func_call(&mut self, expr: &Expr, callee: &Expr, args: &[Expr]) {
        let target = match &callee.kind {
            // A direct call to a named function.
            ExprKind::Id(name) if callee.ty.is_func() => GlobalName(name).to_string(),
            // Anything else (e.g. a call through a function pointer) is
            // evaluated like an ordinary expression.
            _ => {
                self.gen_expr(callee);
                FuncScopeTemp(self.recorder.take()).to_string()
            }
        };

        let mut arg_list = String::new();
        for (i, arg) in args.iter().enumerate() {
            self.gen_expr(arg);
            let value = self.recorder.take();
            if i > 0 {
                arg_list.push_str(", ");
            }
            let _ = write!(arg_list, "{} {}", base_type(&arg.ty), FuncScopeTemp(value));
        }

        let num = self.fresh_temp();
        self.push_line(format_args!(
            "{} ={} call {}({})",
            FuncScopeTemp(num),
            base_type(&expr.ty),
            target,
            arg_list
        ));
        self.recorder.record(num);
    }

    fn gen_unary_expr(&mut self, expr: &Expr, op: UnaryOp, operand: &Expr) {
        match op {
            // Unary plus produces its operand unchanged.
            UnaryOp::Pos => self.gen_expr(operand),
            UnaryOp::Neg => {
                self.gen_expr(operand);
                let value = self.recorder.take();
                let num = self.fresh_temp();
                self.push_line(format_args!(
                    "{} =w neg {}",
                    FuncScopeTemp(num),
                    FuncScopeTemp(value)
                ));
                self.recorder.record(num);
            }
            UnaryOp::Not => {
                self.gen_expr(operand);
                let value = self.recorder.take();
                let num = self.fresh_temp();
                self.push_line(format_args!(
                    "{} =w ceqw {}, 0",
                    FuncScopeTemp(num),
                    FuncScopeTemp(value)
                ));
                self.recorder.record(num);
            }
            UnaryOp::BitComp => {
                self.gen_expr(operand);
                let value = self.recorder.take();
                let num = self.fresh_temp();
                self.push_line(format_args!(
                    "{} =w xor {}, -1",
                    FuncScopeTemp(num),
                    FuncScopeTemp(value)
                ));
                self.recorder.record(num);
            }
            UnaryOp::Incr | UnaryOp::Decr => {
                let ExprKind::Id(id) = &operand.kind else {
                    unreachable!("increment of a non-lvalue survived type checking");
                };
                self.gen_expr(operand);
                let value = self.recorder.take();
                let num = self.fresh_temp();
                let mnemonic = if op == UnaryOp::Incr { "add" } else { "sub" };
                self.push_line(format_args!(
                    "{} =w {} {}, 1",
                    FuncScopeTemp(num),
                    mnemonic,
                    FuncScopeTemp(value)
                ));
                let slot = self.slot_of(id);
                self.push_line(format_args!(
                    "storew {}, {}",
                    FuncScopeTemp(num),
                    FuncScopeTemp(slot)
                ));
                self.recorder.record(num);
            }
            UnaryOp::Addr => {
                // The slot temporary already holds the address; copy it
                // instead of loading through it.
                let ExprKind::Id(id) = &operand.kind else {
                    unreachable!("address-of a non-lvalue survived type checking");
                };
                let slot = self.slot_of(id);
                let num = self.fresh_temp();
                self.push_line(format_args!(
                    "{} =l copy {}",
                    FuncScopeTemp(num),
                    FuncScopeTemp(slot)
                ));
                self.recorder.record(num);
            }
            UnaryOp::Deref => {
                self.gen_expr(operand);
                let pointer = self.recorder.take();
                let num = self.fresh_temp();
                self.push_line(format_args!(
                    "{} ={} load{} {}",
                    FuncScopeTemp(num),
                    base_type(&expr.ty),
                    base_type(&expr.ty),
                    FuncScopeTemp(pointer)
                ));
                self.recorder.record(num);
            }
        }
    }
}

impl Default for QbeIrGen {
    fn default() -> Self {
        Self::new()
    }
}

/// The QBE base type carrying a value of `ty`: pointers are longs,
/// everything else fits a word.
fn base_type(ty: &Type) -> &'static str {
    match ty {
        Type::Ptr(_) | Type::Func { .. } => "l",
        _ => "w",
    }
}

/// Fixed operator-to-mnemonic table. Comparisons use the signed word forms.
fn binary_op_mnemonic(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "add",
        BinaryOp::Sub => "sub",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Mod => "rem",
        BinaryOp::Gt => "csgtw",
        BinaryOp::Gte => "csgew",
        BinaryOp::Lt => "csltw",
        BinaryOp::Lte => "cslew",
        BinaryOp::Eq => "ceqw",
        BinaryOp::Neq => "cnew",
    }
}

/// Collects the `case`/`default` arms of one switch body in textual order,
/// without descending into nested switches (those own their arms).
fn collect_switch_arms(stmt: &Stmt, arms: &mut Vec<Option<i32>>) {
    match stmt {
        Stmt::Case { expr, stmt } => {
            let ExprKind::IntConst(value) = &expr.kind else {
                unreachable!("non-constant case label survived type checking");
            };
            arms.push(Some(*value));
            collect_switch_arms(stmt, arms);
        }
        Stmt::Default { stmt } => {
            arms.push(None);
            collect_switch_arms(stmt, arms);
        }
        Stmt::Compound(block) => {
            for item in &block.items {
                if let BlockItem::Stmt(stmt) = item {
                    collect_switch_arms(stmt, arms);
                }
            }
        }
        Stmt::Labeled { stmt, .. } => collect_switch_arms(stmt, arms),
        Stmt::If { then, or_else, .. } => {
            collect_switch_arms(then, arms);
            if let Some(or_else) = or_else {
                collect_switch_arms(or_else, arms);
            }
        }
        Stmt::While { body, .. } | Stmt::For { body, .. } => collect_switch_arms(body, arms),
        Stmt::Switch { .. } => {}
        _ => {}
    }
}
