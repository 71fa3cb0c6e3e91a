pub mod keys;
pub mod ping;
pub mod string;

use std::collections::HashMap;

use bytes::Bytes;

use crate::db::{CmdLine, Db};
use crate::frame::Frame;

/// A command handler. Receives the database and the arguments with the
/// command name already stripped; arity has been validated by the caller.
/// Handlers return a reply and never touch the network.
pub type ExecFn = fn(&Db, &[Bytes]) -> Frame;

pub struct CommandSpec {
    pub exec: ExecFn,
    /// Declared argument count including the command name. Negative arity
    /// `-n` means "at least n".
    pub arity: i32,
}

/// The command table. Built once at startup and never mutated after, so it
/// can be shared across databases and connections by reference.
pub struct Registry {
    table: HashMap<&'static str, CommandSpec>,
}

impl Registry {
    pub fn new() -> Registry {
        let mut registry = Registry {
            table: HashMap::new(),
        };

        registry.register("get", string::get, 2);
        registry.register("set", string::set, -3);
        registry.register("setnx", string::setnx, 3);
        registry.register("mset", string::mset, -3);
        registry.register("mget", string::mget, -2);
        registry.register("msetnx", string::msetnx, -3);
        registry.register("getset", string::getset, 3);
        registry.register("incr", string::incr, 2);
        registry.register("incrby", string::incrby, 3);
        registry.register("decr", string::decr, 2);
        registry.register("decrby", string::decrby, 3);
        registry.register("strlen", string::strlen, 2);
        registry.register("append", string::append, 3);
        registry.register("setrange", string::setrange, 4);
        registry.register("getrange", string::getrange, 4);

        registry.register("del", keys::del, -2);
        registry.register("exists", keys::exists, -2);
        registry.register("flushdb", keys::flushdb, -1);

        registry.register("ping", ping::ping, -1);

        registry
    }

    fn register(&mut self, name: &'static str, exec: ExecFn, arity: i32) {
        self.table.insert(name, CommandSpec { exec, arity });
    }

    /// Looks up a command by its lowercased name.
    pub fn lookup(&self, name: &str) -> Option<&CommandSpec> {
        self.table.get(name)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the canonical command line handed to the append hook: the
/// lowercased command name followed by the argument bytes untouched.
pub(crate) fn to_cmd_line(name: &str, args: &[Bytes]) -> CmdLine {
    let mut line = Vec::with_capacity(args.len() + 1);
    line.push(Bytes::copy_from_slice(name.as_bytes()));
    line.extend_from_slice(args);
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_is_exact_on_lowercase_names() {
        let registry = Registry::new();

        assert!(registry.lookup("get").is_some());
        assert!(registry.lookup("GET").is_none());
        assert!(registry.lookup("nosuch").is_none());
    }

    #[test]
    fn arities_match_the_command_shapes() {
        let registry = Registry::new();

        assert_eq!(registry.lookup("get").unwrap().arity, 2);
        assert_eq!(registry.lookup("set").unwrap().arity, -3);
        assert_eq!(registry.lookup("setrange").unwrap().arity, 4);
        assert_eq!(registry.lookup("del").unwrap().arity, -2);
    }

    #[test]
    fn cmd_line_keeps_argument_bytes_verbatim() {
        let args = vec![Bytes::from_static(b"key\xff"), Bytes::from_static(b"v")];
        let line = to_cmd_line("set", &args);

        assert_eq!(line.len(), 3);
        assert_eq!(line[0], Bytes::from_static(b"set"));
        assert_eq!(line[1], Bytes::from_static(b"key\xff"));
    }
}
