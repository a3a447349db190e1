#![no_main]

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sinew_core::{Array, ArrayOp, Result, Value};
use sinew_runtime::config::ObservationStrategy;
use sinew_runtime::flags::LifecycleFlags;
use sinew_runtime::reactive::{
    ArrayObserver, CREATED, CollectionObserver, CollectionSubscriber, IndexMap, batch,
    synchronize_indices,
};

#[derive(Arbitrary, Debug)]
enum FuzzOp {
    Push(u8),
    Pop,
    Shift,
    Unshift(u8),
    Splice { start: i8, delete_count: Option<i8>, insert: u8 },
    Reverse,
    Sort,
    Set { index: u8 },
}

#[derive(Arbitrary, Debug)]
struct FuzzInput {
    initial: u8,
    explicit: bool,
    batches: Vec<Vec<FuzzOp>>,
}

#[derive(Default)]
struct Recorder(RefCell<Vec<IndexMap>>);

impl CollectionSubscriber for Recorder {
    fn handle_collection_change(&self, index_map: &IndexMap, _: LifecycleFlags) -> Result<()> {
        self.0.borrow_mut().push(index_map.clone());
        Ok(())
    }
}

struct Fresh(i32);

impl Fresh {
    fn take(&mut self, n: u8) -> Vec<Value> {
        (0..n % 4)
            .map(|_| {
                self.0 += 1;
                Value::from(self.0)
            })
            .collect()
    }
}

fn to_op(op: &FuzzOp, fresh: &mut Fresh) -> ArrayOp {
    match op {
        FuzzOp::Push(n) => ArrayOp::Push(fresh.take(*n)),
        FuzzOp::Pop => ArrayOp::Pop,
        FuzzOp::Shift => ArrayOp::Shift,
        FuzzOp::Unshift(n) => ArrayOp::Unshift(fresh.take(*n)),
        FuzzOp::Splice {
            start,
            delete_count,
            insert,
        } => ArrayOp::Splice {
            start: i64::from(*start),
            delete_count: delete_count.map(i64::from),
            items: fresh.take(*insert),
        },
        FuzzOp::Reverse => ArrayOp::Reverse,
        FuzzOp::Sort => ArrayOp::Sort(None),
        FuzzOp::Set { index } => ArrayOp::Set {
            index: usize::from(*index % 32),
            value: fresh.take(1).pop().unwrap_or_default(),
        },
    }
}

fuzz_target!(|input: FuzzInput| {
    let strategy = if input.explicit {
        ObservationStrategy::Explicit
    } else {
        ObservationStrategy::Intercept
    };
    let initial: Vec<Value> = (0..i32::from(input.initial % 16))
        .map(|n| Value::from(-1 - n))
        .collect();
    let array = Array::from_values(initial);
    let observer = ArrayObserver::new(Rc::clone(&array), strategy);
    let recorder = Rc::new(Recorder::default());
    observer.subscribe(Rc::downgrade(&recorder) as Weak<dyn CollectionSubscriber>);
    let mut fresh = Fresh(0);

    for ops in input.batches.iter().take(16) {
        let before = array.snapshot();
        recorder.0.borrow_mut().clear();
        let _ = batch(|| {
            for op in ops.iter().take(32) {
                let _ = observer.apply_op(to_op(op, &mut fresh));
            }
        });
        let after = array.snapshot();

        let maps = recorder.0.borrow();
        assert!(maps.len() <= 1);
        let Some(map) = maps.first() else {
            continue;
        };
        assert_eq!(map.len(), after.len());
        for (slot, &entry) in map.entries.iter().enumerate() {
            if entry != CREATED {
                assert_eq!(after[slot], before[entry as usize]);
            }
        }
        let mut shadow = before.clone();
        synchronize_indices(&mut shadow, map, |slot| after[slot].clone());
        assert_eq!(shadow, after);
    }
});
