use crate::schema::Migration;

/// Callback receiving a percentage and the step being started.
pub type ProgressFn = Box<dyn FnMut(f64, &str)>;

/// Turns step starts into percentages for a caller supplied callback.
///
/// The total is fixed up front from the planned step count. Every step that
/// starts reports the share of steps already completed, so the first report
/// is 0 and `finish` reports 100.
pub struct ProgressHandler {
    progress_func: ProgressFn,
    total_steps: usize,
    current_step: usize,
}

impl ProgressHandler {
    pub fn new(progress_func: ProgressFn, total_steps: usize) -> Self {
        ProgressHandler {
            progress_func,
            total_steps,
            current_step: 0,
        }
    }

    pub fn percentage(&self) -> f64 {
        if self.total_steps == 0 {
            return 100.0;
        }
        100.0 * self.current_step as f64 / self.total_steps as f64
    }

    pub fn step_started(&mut self, step: &Migration) {
        let pct = self.percentage();
        (self.progress_func)(pct, &format!("{} {}", step.label(), step.message));
        self.current_step += 1;
    }

    pub fn finish(&mut self) {
        self.current_step = self.total_steps;
        (self.progress_func)(100.0, "done");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{find, MIGRATIONS};
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<f64>>>, ProgressFn) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        (seen, Box::new(move |pct, _msg| sink.borrow_mut().push(pct)))
    }

    #[test]
    fn test_reports_completed_share() {
        let (seen, func) = recorder();
        let mut handler = ProgressHandler::new(func, 4);
        for step in MIGRATIONS.iter().take(4) {
            handler.step_started(step);
        }
        handler.finish();
        assert_eq!(*seen.borrow(), vec![0.0, 25.0, 50.0, 75.0, 100.0]);
    }

    #[test]
    fn test_zero_total_is_complete() {
        let (seen, func) = recorder();
        let mut handler = ProgressHandler::new(func, 0);
        assert_eq!(handler.percentage(), 100.0);
        if let Some(step) = find(300) {
            handler.step_started(step);
        }
        assert_eq!(*seen.borrow(), vec![100.0]);
    }
}
