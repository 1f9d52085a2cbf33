//! Rust identifiers for functions and modules.
//!
//! A function is named after its `name` section entry when that entry
//! sanitizes to an identifier that cannot collide with anything the
//! compiler generates; otherwise it is `f{index}`.

use std::collections::HashSet;

use warp_wasm::Module;

const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue", "crate",
    "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen", "if", "impl",
    "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override", "priv", "pub", "ref",
    "return", "self", "static", "struct", "super", "trait", "true", "try", "type", "typeof",
    "union", "unsafe", "unsized", "use", "virtual", "where", "while", "yield",
];

/// Locals, items and crate roots of the generated module that a function
/// name must not shadow.
const RESERVED: &[&str] = &[
    "alloc",
    "check_ready",
    "core",
    "func_ref",
    "idx",
    "imports",
    "instance",
    "memory",
    "name",
    "numerics",
    "out",
    "ret",
    "run_start",
    "std",
    "table",
    "this",
    "thread",
    "warp_exec",
];

pub(crate) fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// A plain ASCII identifier that is not a keyword.
pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name != "_"
        && !is_keyword(name)
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

/// One or two lowercase letters and optional digits: the shape of every
/// generated local (`m`, `t`, `v3`, `t12`, `fi0`, `g2`, `d0`, ...).
fn is_short(name: &str) -> bool {
    let letters = name.chars().take_while(char::is_ascii_lowercase).count();
    (1..=2).contains(&letters) && name[letters..].chars().all(|c| c.is_ascii_digit())
}

fn usable(name: &str) -> bool {
    is_identifier(name)
        && name.starts_with(|c: char| c.is_ascii_lowercase() || c == '_')
        && !is_short(name)
        && !RESERVED.contains(&name)
        && !name.ends_with("_thunk")
        && !name.starts_with("call_indirect")
}

/// The Rust name of every function, by function index.
pub(crate) fn function_names(module: &Module) -> Vec<String> {
    let count = module.function_count();
    let mut taken = HashSet::new();
    let mut names = Vec::with_capacity(count as usize);
    for index in 0..count {
        let candidate = module
            .function_name(index)
            .map(sanitize)
            .filter(|name| usable(name) && !taken.contains(name));
        let name = match candidate {
            Some(name) => name,
            None => format!("f{index}"),
        };
        taken.insert(name.clone());
        names.push(name);
    }
    names
}
