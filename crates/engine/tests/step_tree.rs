use std::{cell::Cell, rc::Rc};

use scanflow_engine::{CallbackResetStep, CallbackStep, MarkerStep, RepeatWholeWorkflowStep, StepOutcome, StepRef, WorkflowManager};
use scanflow_types::InMemoryRegister;

fn flag() -> Rc<Cell<bool>> {
    Rc::new(Cell::new(false))
}

fn setter(flag: &Rc<Cell<bool>>) -> impl FnMut(&mut scanflow_engine::ProcessContext, &mut dyn scanflow_types::MemoryRegister) + 'static {
    let flag = Rc::clone(flag);
    move |_, _| flag.set(true)
}

#[test]
fn adding_a_step_makes_the_manager_need_processing() {
    let mut manager = WorkflowManager::new();
    assert!(!manager.needs_process());

    manager.add_step(MarkerStep::new("mk", 9));
    assert!(manager.needs_process());
}

#[test]
fn steps_are_removed_by_name_key_and_instance_key() {
    let mut manager = WorkflowManager::new();
    manager.add_step(MarkerStep::new("mk1", 9));
    manager.add_step(MarkerStep::new("mk2", 8));
    let third = manager.add_step(MarkerStep::new("mk3", 7));
    assert_eq!(manager.len(), 3);

    assert!(manager.remove_step("mk1").is_some());
    assert_eq!(manager.len(), 2);

    assert!(manager.remove_step(8_i64).is_some());
    assert_eq!(manager.len(), 1);
    assert!(manager.needs_process());

    assert!(manager.remove_step(third).is_some());
    assert!(manager.is_empty());
    assert!(!manager.needs_process());

    assert!(manager.remove_step("mk1").is_none());

    let unkeyed = MarkerStep::unkeyed("mk4");
    let by_instance = StepRef::of(&unkeyed).expect("named step");
    manager.add_step(unkeyed);
    let keyed = MarkerStep::new("mk5", 2);
    let by_key = StepRef::of(&keyed).expect("keyed step");
    manager.add_step(keyed);

    assert!(manager.remove_step(by_instance).is_some());
    assert!(manager.remove_step(by_key).is_some());
    assert!(manager.is_empty());
}

#[test]
fn markers_run_through_in_one_cycle() {
    let mut manager = WorkflowManager::new();
    manager.add_step(MarkerStep::new("mk1", 9));
    manager.add_step(MarkerStep::new("mk2", 8));
    manager.add_step(MarkerStep::new("mk3", 7));

    assert!(manager.needs_process());
    manager.process(&mut InMemoryRegister::new());
    assert!(!manager.needs_process());
}

#[test]
fn callback_steps_run_one_per_cycle() {
    let (a, b, c) = (flag(), flag(), flag());
    let mut manager = WorkflowManager::new();
    manager.add_step(CallbackStep::new("cb1", setter(&a)));
    manager.add_step(CallbackStep::new("cb1", setter(&b)));
    manager.add_step(CallbackStep::new("cb1", setter(&c)));

    let mut register = InMemoryRegister::new();
    manager.process(&mut register);
    assert!(a.get() && !b.get() && !c.get());

    manager.process(&mut register);
    assert!(a.get() && b.get() && !c.get());

    manager.process(&mut register);
    assert!(a.get() && b.get() && c.get());
    assert!(!manager.needs_process());

    for _ in 0..5 {
        manager.process(&mut register);
    }
    assert!(!manager.needs_process());
}

#[test]
fn steps_run_in_ascending_key_order() {
    let order = Rc::new(std::cell::RefCell::new(Vec::new()));
    let mut manager = WorkflowManager::new();
    for key in [30, 10, 20] {
        let sink = Rc::clone(&order);
        manager.add_step(CallbackStep::new(format!("step {key}"), move |_, _| sink.borrow_mut().push(key)).with_key(key));
    }

    let mut register = InMemoryRegister::new();
    while manager.needs_process() {
        manager.process(&mut register);
    }
    assert_eq!(*order.borrow(), vec![10, 20, 30]);
}

#[test]
fn loop_mode_wraps_without_resetting_steps() {
    let (a, b, reset_called) = (flag(), flag(), flag());
    let mut manager = WorkflowManager::new();
    manager.set_loop_workflow(true);

    manager.add_step(CallbackStep::new("cb1", setter(&a)));
    let reset_flag = Rc::clone(&reset_called);
    manager.add_step(CallbackResetStep::new("cb2", setter(&b)).with_reset(move |_| reset_flag.set(true)));

    let mut register = InMemoryRegister::new();
    manager.process(&mut register);
    manager.process(&mut register);
    assert!(a.get() && b.get());

    a.set(false);
    b.set(false);
    manager.process(&mut register);
    assert!(!reset_called.get());

    manager.process(&mut register);
    assert!(a.get() && b.get());
    assert!(!reset_called.get());
    assert!(manager.needs_process());
}

#[test]
fn repeat_whole_resets_every_step_once_and_restarts() {
    let (a, b) = (flag(), flag());
    let resets = Rc::new(Cell::new(0));
    let mut manager = WorkflowManager::new();

    manager.add_step(CallbackStep::new("cb1", setter(&a)));
    let (reset_a, reset_b, counter) = (Rc::clone(&a), Rc::clone(&b), Rc::clone(&resets));
    manager.add_step(CallbackResetStep::new("cb2", setter(&b)).with_reset(move |_| {
        reset_a.set(false);
        reset_b.set(false);
        counter.set(counter.get() + 1);
    }));
    manager.add_step(RepeatWholeWorkflowStep::new("rp", 44));

    let mut register = InMemoryRegister::new();
    manager.process(&mut register);
    manager.process(&mut register);
    assert!(a.get() && b.get());

    // The repeat step resets everything and reruns the first step in the same cycle.
    manager.process(&mut register);
    assert!(a.get());
    assert!(!b.get());
    assert_eq!(resets.get(), 1);

    manager.process(&mut register);
    assert!(a.get() && b.get());
    assert_eq!(resets.get(), 1);
}

#[test]
fn terminate_suspends_until_restarted() {
    let runs = Rc::new(Cell::new(0));
    let counter = Rc::clone(&runs);
    let mut manager = WorkflowManager::new();
    manager.add_step(CallbackStep::with_outcome("count", move |_, _| {
        counter.set(counter.get() + 1);
        StepOutcome::advance()
    }));
    manager.add_step(CallbackStep::with_outcome("stop", |_, _| StepOutcome::terminate()));

    let mut register = InMemoryRegister::new();
    manager.process(&mut register);
    manager.process(&mut register);
    assert!(!manager.needs_process());

    manager.process(&mut register);
    assert_eq!(runs.get(), 1);

    assert!(manager.restart_with_step("count", &mut register));
    manager.process(&mut register);
    assert_eq!(runs.get(), 2);
}

#[test]
fn removing_the_last_step_stops_processing() {
    let mut manager = WorkflowManager::new();
    let key = manager.add_step(CallbackStep::with_outcome("wait", |_, _| StepOutcome::stay()));
    let mut register = InMemoryRegister::new();
    manager.process(&mut register);
    assert!(manager.needs_process());

    manager.remove_step(key);
    assert!(!manager.needs_process());
    assert!(manager.current_step().is_none());
}
