use crate::{
    add_native_word,
    runtime::{
        data_structures::cell::{cell_from_int, Cell},
        error::{self, forth_error_str, ErrorKind},
        interpreter::Interpreter,
    },
};
use rand::Rng;

/// Register the random number words.
pub fn register_random_words(interpreter: &mut dyn Interpreter) {
    add_native_word!(
        interpreter,
        "RANDOM",
        |interpreter: &mut dyn Interpreter| {
            let value: Cell = rand::thread_rng().gen();

            interpreter.push(value);
            Ok(())
        },
        "Push a random cell."
    );

    add_native_word!(
        interpreter,
        "RND",
        |interpreter: &mut dyn Interpreter| {
            let limit = interpreter.pop_as_int()?;

            if limit <= 0 {
                return forth_error_str(
                    interpreter,
                    ErrorKind::Arithmetic,
                    "RND needs a positive limit.",
                );
            }

            let value = rand::thread_rng().gen_range(0..limit);

            interpreter.push(cell_from_int(value));
            Ok(())
        },
        "Push a random value between 0 and the popped limit, exclusive."
    );
}
