//! Opt-in function libraries beyond the standard library.
//!
//! Add one to an environment with [`Env::with_extension`](crate::Env::with_extension):
//!
//! ```
//! use cel_engine::ext::string_extension;
//! use cel_engine::{Env, Value};
//!
//! let env = Env::with_standard_library().with_extension(string_extension());
//! let ast = env.compile("'  Hello '.trim().lowerAscii()").unwrap();
//! let program = env.program(&ast).unwrap();
//! assert_eq!(program.eval_empty(), Ok(Value::from("hello")));
//! ```

mod strings;

pub use strings::string_extension;
