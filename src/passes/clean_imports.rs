//! Hoists every import to the top of the module and deduplicates them by
//! structural equality, keeping the rest of the program order intact.

use crate::surface::ast::Stmt;
use crate::surface::printer::render_program;
use crate::visit::rewrite_block;
use crate::Error;

use super::PassContext;

pub fn run(stmts: Vec<Stmt>, _cx: &mut PassContext) -> Result<Vec<Stmt>, Error> {
    let mut imports: Vec<Stmt> = Vec::new();
    let rest = rewrite_block(stmts, false, &mut |stmt| {
        if stmt.is_import() {
            imports.push(stmt);
            Vec::new()
        } else {
            vec![stmt]
        }
    });

    let rendered: Vec<String> = imports
        .iter()
        .map(|stmt| render_program(std::slice::from_ref(stmt)))
        .collect();
    let mut deduped: Vec<Stmt> = Vec::new();
    for (index, stmt) in imports.into_iter().enumerate() {
        let later_duplicate = rendered[index + 1..]
            .iter()
            .any(|other| *other == rendered[index]);
        if !later_duplicate {
            deduped.push(stmt);
        }
    }

    deduped.extend(rest);
    Ok(deduped)
}
