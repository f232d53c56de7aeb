//! Walks the statement tree and emits commands with unresolved operand
//! slots.

use swm_asm::{BinaryAlu, Condition, UnaryAlu, Value, Width};
use tracing::debug;

use crate::{
    cmd::{Cmd, CmdId, CmdList, OperandField},
    ir::{BinaryOp, Expr, FlowControl, IdFactory, Stmt, UnaryOp, VarId},
    labels::LabelMap,
    memmap::MemMap,
    scope::Scope,
    CompileError,
};

const LABEL_LOOP_BEGIN: &str = "LoopBegin";
const LABEL_LOOP_CHECK: &str = "LoopCondition";
const LABEL_LOOP_END: &str = "LoopEnd";
const LABEL_COND_IF: &str = "ConditionalIf";
const LABEL_COND_ELSE: &str = "ConditionalElse";
const LABEL_COND_END: &str = "ConditionalEnd";

/// Lowers statements into a [`CmdList`], recording a register request in the
/// scope for every operand slot it leaves behind.
pub(crate) struct Lowerer<'a> {
    cmds: CmdList,
    scope: Scope,
    mem: MemMap,
    labels: LabelMap,
    ids: &'a mut IdFactory,
    width: Width,
}

impl<'a> Lowerer<'a> {
    pub fn new(ids: &'a mut IdFactory, width: Width) -> Self {
        Self {
            cmds: CmdList::new(),
            scope: Scope::new(),
            mem: MemMap::new(),
            labels: LabelMap::new(),
            ids,
            width,
        }
    }

    pub fn into_parts(self) -> (CmdList, Scope, MemMap, LabelMap) {
        (self.cmds, self.scope, self.mem, self.labels)
    }

    fn emit(&mut self, cmd: Cmd) -> CmdId {
        self.cmds.push_back(cmd)
    }

    /// Position of the command just emitted.
    fn hint(&self) -> usize {
        self.cmds.len() - 1
    }

    /// Register `field` of the just-emitted `cmd` as an operand slot of `var`.
    fn slot(&mut self, cmd: CmdId, field: OperandField, var: VarId) {
        let hint = self.hint();
        self.scope.add_entry(Some((cmd, field)), hint, var, cmd);
    }

    pub fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match stmt {
            Stmt::Assign { var, expr, define } => {
                let newly_defined = *define && !self.mem.contains(*var);
                if newly_defined {
                    self.mem.create(*var, self.width);
                }
                self.lower_expr(expr, Some(*var))?;
                if newly_defined {
                    self.scope.mark_defined(*var);
                }
                Ok(())
            }
            Stmt::Expr(expr) => self.lower_expr(expr, None).map(|_| ()),
            Stmt::FlowControl(control) => self.lower_flow(*control),
            Stmt::Loop {
                init,
                cond,
                step,
                body,
            } => self.lower_loop(init.as_deref(), cond.as_ref(), step.as_deref(), body),
            Stmt::Conditional { arms, else_body } => {
                self.lower_conditional(arms, else_body)
            }
        }
    }

    /// Lower an expression; the returned id names the value's slot.
    ///
    /// `res` forces the result id, tying the final operand slot to an
    /// assignment target. A bare variable reference emits nothing and simply
    /// returns its own id.
    pub fn lower_expr(
        &mut self,
        expr: &Expr,
        res: Option<VarId>,
    ) -> Result<VarId, CompileError> {
        match expr {
            Expr::Variable(id) => Ok(*id),
            Expr::Constant(value) => {
                let res = res.unwrap_or_else(|| self.ids.fresh());
                let cmd = self.emit(Cmd::LoadConst {
                    dst: 0,
                    value: Value::new(*value, self.width),
                });
                self.slot(cmd, OperandField::A, res);
                Ok(res)
            }
            Expr::Binary { op, lhs, rhs } => {
                // Operands lower right to left.
                let rhs_id = self.lower_expr(rhs, None)?;
                let lhs_id = self.lower_expr(lhs, None)?;
                let res = res.unwrap_or_else(|| self.ids.fresh());

                let alu = match op {
                    BinaryOp::Add => BinaryAlu::Add,
                    BinaryOp::Sub => BinaryAlu::Sub,
                    BinaryOp::Mul => BinaryAlu::Mul,
                    BinaryOp::Div => BinaryAlu::Div,
                    BinaryOp::Mod => BinaryAlu::Mod,
                };
                let cmd = self.emit(Cmd::Binary {
                    op: alu,
                    a: 0,
                    b: 0,
                    out: 0,
                });
                self.slot(cmd, OperandField::A, lhs_id);
                self.slot(cmd, OperandField::B, rhs_id);
                self.slot(cmd, OperandField::C, res);
                Ok(res)
            }
            Expr::Unary { op, expr, post } => self.lower_unary(*op, expr, *post, res),
        }
    }

    fn lower_unary(
        &mut self,
        op: UnaryOp,
        expr: &Expr,
        post: bool,
        res: Option<VarId>,
    ) -> Result<VarId, CompileError> {
        let expr_id = self.lower_expr(expr, None)?;

        match (op, post) {
            (UnaryOp::Plus, false) => Ok(expr_id),
            (UnaryOp::Plus | UnaryOp::Minus, true) => {
                Err(CompileError::InvalidOperation { op, post })
            }
            (UnaryOp::Minus, false) => {
                let res = res.unwrap_or_else(|| self.ids.fresh());
                let cmd = self.emit(Cmd::UnaryMove {
                    op: UnaryAlu::Inv,
                    src: 0,
                    dst: 0,
                });
                self.slot(cmd, OperandField::A, expr_id);
                self.slot(cmd, OperandField::B, res);
                Ok(res)
            }
            (UnaryOp::Incr | UnaryOp::Decr, true) => {
                // The caller sees the pre-value; the mutation lands after.
                let res = res.unwrap_or_else(|| self.ids.fresh());
                let copy = self.emit(Cmd::CopyReg { src: 0, dst: 0 });
                self.slot(copy, OperandField::A, expr_id);
                self.slot(copy, OperandField::B, res);

                let mutate = self.emit(Cmd::Unary {
                    op: in_place_op(op),
                    reg: 0,
                });
                self.slot(mutate, OperandField::A, expr_id);
                Ok(res)
            }
            (UnaryOp::Incr | UnaryOp::Decr, false) => {
                let res = res.unwrap_or_else(|| self.ids.fresh());
                let mutate = self.emit(Cmd::Unary {
                    op: in_place_op(op),
                    reg: 0,
                });
                self.slot(mutate, OperandField::A, expr_id);

                let copy = self.emit(Cmd::CopyReg { src: 0, dst: 0 });
                self.slot(copy, OperandField::A, expr_id);
                self.slot(copy, OperandField::B, res);
                Ok(res)
            }
        }
    }

    fn lower_flow(&mut self, control: FlowControl) -> Result<(), CompileError> {
        let label = match control {
            FlowControl::Break => self.scope.break_label.clone(),
            FlowControl::Continue => self.scope.continue_label.clone(),
            FlowControl::Return => None,
        };
        match label {
            Some(label) => {
                self.emit(Cmd::Jump { label });
                Ok(())
            }
            None => Err(CompileError::ScopeControl(control)),
        }
    }

    fn lower_loop(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        step: Option<&Stmt>,
        body: &[Stmt],
    ) -> Result<(), CompileError> {
        self.scope.push_loop();

        if let Some(init) = init {
            self.lower_stmt(init)?;
        }

        // Zero sentinel for the truthiness compare at the back edge.
        let zero = self.ids.fresh();
        let cmd = self.emit(Cmd::LoadConst {
            dst: 0,
            value: Value::new(0, Width::B1),
        });
        self.slot(cmd, OperandField::A, zero);

        let begin = self.labels.unique(LABEL_LOOP_BEGIN);
        let check = self.labels.unique(LABEL_LOOP_CHECK);
        let end = self.labels.unique(LABEL_LOOP_END);
        debug!(begin, check, end, "lowering loop");

        let old_break = self.scope.break_label.replace(end.clone());
        let old_continue = self.scope.continue_label.replace(begin.clone());

        self.emit(Cmd::Jump {
            label: check.clone(),
        });
        self.emit(Cmd::Label(begin.clone()));

        for stmt in body {
            self.lower_stmt(stmt)?;
        }
        if let Some(step) = step {
            self.lower_stmt(step)?;
        }

        self.emit(Cmd::Label(check));
        match cond {
            Some(cond) => {
                let cond_id = self.lower_expr(cond, None)?;
                let jump = self.emit(Cmd::JumpIf {
                    cond: Condition::Less,
                    a: 0,
                    b: 0,
                    label: begin,
                });
                self.slot(jump, OperandField::A, zero);
                self.slot(jump, OperandField::B, cond_id);
            }
            // No condition: loop until a break jumps out.
            None => {
                self.emit(Cmd::Jump { label: begin });
            }
        }

        let end_cmd = self.emit(Cmd::Label(end));

        self.scope.break_label = old_break;
        self.scope.continue_label = old_continue;

        let hint = self.hint();
        self.scope.pop_loop(hint, end_cmd);
        Ok(())
    }

    fn lower_conditional(
        &mut self,
        arms: &[crate::ir::ConditionalArm],
        else_body: &[Stmt],
    ) -> Result<(), CompileError> {
        if arms.is_empty() {
            return Err(CompileError::MissingExpression("conditional"));
        }

        let zero = self.ids.fresh();
        let cmd = self.emit(Cmd::LoadConst {
            dst: 0,
            value: Value::new(0, Width::B1),
        });
        self.slot(cmd, OperandField::A, zero);

        let arm_labels: Vec<String> = arms
            .iter()
            .map(|_| self.labels.unique(LABEL_COND_IF))
            .collect();
        let else_label = self.labels.unique(LABEL_COND_ELSE);
        let end_label = self.labels.unique(LABEL_COND_END);
        debug!(arms = arms.len(), "lowering conditional");

        for (arm, label) in arms.iter().zip(&arm_labels) {
            let cond_id = self.lower_expr(&arm.cond, None)?;
            let jump = self.emit(Cmd::JumpIf {
                cond: Condition::Less,
                a: 0,
                b: 0,
                label: label.clone(),
            });
            self.slot(jump, OperandField::A, zero);
            self.slot(jump, OperandField::B, cond_id);
        }

        self.emit(Cmd::Jump {
            label: else_label.clone(),
        });

        for (arm, label) in arms.iter().zip(arm_labels) {
            self.emit(Cmd::Label(label));
            for stmt in &arm.body {
                self.lower_stmt(stmt)?;
            }
            self.emit(Cmd::Jump {
                label: end_label.clone(),
            });
        }

        self.emit(Cmd::Label(else_label));
        for stmt in else_body {
            self.lower_stmt(stmt)?;
        }
        self.emit(Cmd::Label(end_label));
        Ok(())
    }
}

fn in_place_op(op: UnaryOp) -> UnaryAlu {
    match op {
        UnaryOp::Incr => UnaryAlu::Inc,
        _ => UnaryAlu::Dec,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConditionalArm, Expr};

    use rstest::rstest;

    fn lowered(build: impl FnOnce(&mut IdFactory) -> Stmt) -> Vec<Cmd> {
        let mut ids = IdFactory::new();
        let stmt = build(&mut ids);
        let mut lowerer = Lowerer::new(&mut ids, Width::B4);
        lowerer.lower_stmt(&stmt).expect("statement must lower");
        let (cmds, ..) = lowerer.into_parts();
        cmds.iter().map(|(_, cmd)| cmd.clone()).collect()
    }

    #[test]
    fn binary_operands_lower_right_to_left() {
        let cmds = lowered(|_| {
            Stmt::Expr(Expr::binary(
                BinaryOp::Sub,
                Expr::constant(1),
                Expr::constant(2),
            ))
        });

        let constants: Vec<i64> = cmds
            .iter()
            .filter_map(|cmd| match cmd {
                Cmd::LoadConst { value, .. } => Some(value.signed()),
                _ => None,
            })
            .collect();
        // The right operand's constant is loaded first.
        assert_eq!(constants, [2, 1]);
        assert!(matches!(
            cmds.last(),
            Some(Cmd::Binary {
                op: BinaryAlu::Sub,
                ..
            })
        ));
    }

    #[test]
    fn modulus_selects_the_mod_instruction() {
        let cmds = lowered(|_| {
            Stmt::Expr(Expr::binary(
                BinaryOp::Mod,
                Expr::constant(9),
                Expr::constant(4),
            ))
        });
        assert!(matches!(
            cmds.last(),
            Some(Cmd::Binary {
                op: BinaryAlu::Mod,
                ..
            })
        ));
    }

    #[test]
    fn postfix_mutation_follows_the_copy() {
        let cmds = lowered(|ids| {
            let v = ids.fresh();
            Stmt::Expr(Expr::unary_post(UnaryOp::Incr, Expr::var(v)))
        });
        assert!(matches!(cmds[0], Cmd::CopyReg { .. }));
        assert!(matches!(
            cmds[1],
            Cmd::Unary {
                op: UnaryAlu::Inc,
                ..
            }
        ));
    }

    #[test]
    fn prefix_mutation_precedes_the_copy() {
        let cmds = lowered(|ids| {
            let v = ids.fresh();
            Stmt::Expr(Expr::unary(UnaryOp::Decr, Expr::var(v)))
        });
        assert!(matches!(
            cmds[0],
            Cmd::Unary {
                op: UnaryAlu::Dec,
                ..
            }
        ));
        assert!(matches!(cmds[1], Cmd::CopyReg { .. }));
    }

    #[rstest]
    #[case(UnaryOp::Plus)]
    #[case(UnaryOp::Minus)]
    fn illegal_unary_positions_are_rejected(#[case] op: UnaryOp) {
        let mut ids = IdFactory::new();
        let stmt = Stmt::Expr(Expr::unary_post(op, Expr::constant(1)));
        let mut lowerer = Lowerer::new(&mut ids, Width::B4);
        assert_eq!(
            lowerer.lower_stmt(&stmt),
            Err(CompileError::InvalidOperation { op, post: true })
        );
    }

    #[test]
    fn prefix_plus_is_the_identity() {
        let cmds = lowered(|ids| {
            let v = ids.fresh();
            Stmt::Expr(Expr::unary(UnaryOp::Plus, Expr::var(v)))
        });
        assert!(cmds.is_empty());
    }

    #[test]
    fn flow_control_outside_a_loop_is_rejected() {
        let mut ids = IdFactory::new();
        for control in [FlowControl::Break, FlowControl::Continue, FlowControl::Return] {
            let mut lowerer = Lowerer::new(&mut ids, Width::B4);
            assert_eq!(
                lowerer.lower_stmt(&Stmt::FlowControl(control)),
                Err(CompileError::ScopeControl(control))
            );
        }
    }

    #[test]
    fn return_is_rejected_even_inside_a_loop() {
        let mut ids = IdFactory::new();
        let stmt = Stmt::Loop {
            init: None,
            cond: None,
            step: None,
            body: vec![Stmt::FlowControl(FlowControl::Return)],
        };
        let mut lowerer = Lowerer::new(&mut ids, Width::B4);
        assert_eq!(
            lowerer.lower_stmt(&stmt),
            Err(CompileError::ScopeControl(FlowControl::Return))
        );
    }

    #[test]
    fn conditional_requires_at_least_one_arm() {
        let mut ids = IdFactory::new();
        let stmt = Stmt::Conditional {
            arms: vec![],
            else_body: vec![],
        };
        let mut lowerer = Lowerer::new(&mut ids, Width::B4);
        assert_eq!(
            lowerer.lower_stmt(&stmt),
            Err(CompileError::MissingExpression("conditional"))
        );
    }

    #[test]
    fn definitions_reserve_heap_slots_at_the_program_width() {
        let mut ids = IdFactory::new();
        let a = ids.fresh();
        let b = ids.fresh();
        let mut lowerer = Lowerer::new(&mut ids, Width::B4);
        lowerer
            .lower_stmt(&Stmt::Assign {
                var: a,
                expr: Expr::constant(1),
                define: true,
            })
            .unwrap();
        lowerer
            .lower_stmt(&Stmt::Assign {
                var: b,
                expr: Expr::constant(2),
                define: true,
            })
            .unwrap();
        // Reassignment must not grow the map.
        lowerer
            .lower_stmt(&Stmt::Assign {
                var: a,
                expr: Expr::constant(3),
                define: true,
            })
            .unwrap();

        let (_, _, mem, _) = lowerer.into_parts();
        assert_eq!(mem.size(), 8);
        assert_eq!(mem.get(a).unwrap().offset, 0);
        assert_eq!(mem.get(b).unwrap().offset, 4);
    }

    #[test]
    fn conditional_arms_get_distinct_labels() {
        let cmds = lowered(|ids| {
            let v = ids.fresh();
            Stmt::Conditional {
                arms: vec![
                    ConditionalArm {
                        cond: Expr::var(v),
                        body: vec![],
                    },
                    ConditionalArm {
                        cond: Expr::var(v),
                        body: vec![],
                    },
                ],
                else_body: vec![],
            }
        });

        let mut labels: Vec<&String> = cmds
            .iter()
            .filter_map(|cmd| match cmd {
                Cmd::Label(name) => Some(name),
                _ => None,
            })
            .collect();
        let before = labels.len();
        labels.dedup();
        assert_eq!(labels.len(), before);
    }
}
