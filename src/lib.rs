//! Workspace root; exists to carry git-hook tooling. The actual crates
//! live under `crates/`.
