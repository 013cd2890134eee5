//! Instrumenting method bodies at the expression level
//!
//! An [`ExprEditor`] walks a method body and hands every instrumentable site (method calls,
//! field accesses, allocations, casts, `instanceof` checks, and exception handlers) to an
//! [`ExprVisitor`]. The visitor can then [replace](Expr::replace) the site with a snippet, which
//! is compiled by an external [`SnippetCompiler`] against a [`SnippetContract`] describing the
//! values the site consumes and produces.
//!
//! Replacing a site works like this:
//!
//!   1. check the snippet assigns `$_` if the site produces a value
//!   2. compile the snippet (nothing has been modified yet, so a compile error leaves the method
//!      untouched)
//!   3. wrap the snippet so that it stores the site's operands into locals on entry and pushes
//!      `$_` on exit
//!   4. open a gap at the end of the site if the new code is longer, blank out the site, and
//!      write in the new code
//!   5. merge the snippet's exception handlers into the method and bump `max_stack` and
//!      `max_locals`

mod compiler;
mod editor;
#[allow(clippy::module_inception)]
mod expr;

pub use compiler::*;
pub use editor::*;
pub use expr::{Expr, ExprKind};
