use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::error::GraphResult;
use crate::processing::RowStream;
use crate::types::Row;

struct TeeState<'a> {
    input: RowStream<'a>,
    queues: Vec<VecDeque<GraphResult<Row>>>,
    open: Vec<bool>,
    done: bool,
}

/// Broadcasts one stream to a fixed number of consumers.
///
/// The input is pulled by whichever consumer is furthest ahead; every item it yields is
/// queued for the others, so a lagging consumer costs memory proportional to its lag. A
/// dropped consumer stops receiving copies. Errors are delivered to every consumer.
pub(crate) struct Tee<'a> {
    state: Rc<RefCell<TeeState<'a>>>,
    handed_out: usize,
}

impl<'a> Tee<'a> {
    pub(crate) fn new(input: RowStream<'a>, consumers: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(TeeState {
                input,
                queues: (0..consumers).map(|_| VecDeque::new()).collect(),
                open: vec![true; consumers],
                done: false,
            })),
            handed_out: 0,
        }
    }

    /// The next consumer's stream; at most `consumers` handles are handed out.
    pub(crate) fn handle(&mut self) -> TeeHandle<'a> {
        let id = self.handed_out;
        self.handed_out += 1;
        TeeHandle {
            state: Rc::clone(&self.state),
            id,
        }
    }
}

pub(crate) struct TeeHandle<'a> {
    state: Rc<RefCell<TeeState<'a>>>,
    id: usize,
}

impl Iterator for TeeHandle<'_> {
    type Item = GraphResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut state = self.state.borrow_mut();
        if let Some(item) = state.queues[self.id].pop_front() {
            return Some(item);
        }
        if state.done {
            return None;
        }

        let Some(item) = state.input.next() else {
            state.done = true;
            return None;
        };
        if item.is_err() {
            state.done = true;
        }
        let TeeState { queues, open, .. } = &mut *state;
        for (j, queue) in queues.iter_mut().enumerate() {
            if j != self.id && open[j] {
                queue.push_back(item.clone());
            }
        }
        Some(item)
    }
}

impl Drop for TeeHandle<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.try_borrow_mut() {
            state.open[self.id] = false;
            state.queues[self.id].clear();
        }
    }
}
