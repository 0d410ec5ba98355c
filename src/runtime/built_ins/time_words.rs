use crate::{
    add_native_word,
    runtime::{
        data_structures::cell::Cell,
        error::{self},
        interpreter::Interpreter,
    },
};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Register the time words.
pub fn register_time_words(interpreter: &mut dyn Interpreter) {
    add_native_word!(
        interpreter,
        "MS",
        |interpreter: &mut dyn Interpreter| {
            let millis = interpreter.pop_as_int()?.max(0) as u64;

            std::thread::sleep(Duration::from_millis(millis));
            Ok(())
        },
        "Sleep for the popped number of milliseconds."
    );

    add_native_word!(
        interpreter,
        "TICKS",
        |interpreter: &mut dyn Interpreter| {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_millis() as Cell)
                .unwrap_or(0);

            interpreter.push(millis);
            Ok(())
        },
        "Push the wall clock time in milliseconds."
    );
}
