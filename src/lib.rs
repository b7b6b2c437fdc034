use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub mod builtin;
pub mod command;
pub mod eval;
pub mod interp;
pub mod lex;
pub mod parse;
pub mod system;
pub mod types;
pub mod value;

pub use builtin::process_message;
pub use command::{CmdContext, Command, Macro, PermissionLevel};
pub use eval::{EvalError, Interpreter};
pub use interp::{EvalFailure, InterpState, RegistryError};
pub use lex::Lexer;
pub use parse::{Expr, ParseError, Parser};
pub use types::Type;
pub use value::Value;

/// Shared state behind a reader-writer lock. A panic while the lock was
/// held does not poison it for everyone else.
#[derive(Debug, Default)]
pub struct Synchronised<T> {
    inner: RwLock<T>,
}

impl<T> Synchronised<T> {
    pub fn new(value: T) -> Self {
        Synchronised {
            inner: RwLock::new(value),
        }
    }

    pub fn rlock(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn wlock(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn map_read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.rlock())
    }

    pub fn map_write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.wlock())
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;

    #[test]
    fn writers_see_each_other() {
        let shared = Arc::new(Synchronised::new(Vec::new()));
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || shared.map_write(|v| v.push(i)))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(shared.map_read(Vec::len), 4);
        let mut all = Arc::try_unwrap(shared).unwrap().into_inner();
        all.sort();
        assert_eq!(all, vec![0, 1, 2, 3]);
    }

    #[test]
    fn poisoned_locks_stay_usable() {
        let shared = Arc::new(Synchronised::new(1));
        let clone = Arc::clone(&shared);
        let _ = thread::spawn(move || {
            let _guard = clone.wlock();
            panic!("boom");
        })
        .join();

        *shared.wlock() += 1;
        assert_eq!(*shared.rlock(), 2);
    }
}
