//! Predicate-level code assembly with first-argument indexing.
//!
//! Clauses are partitioned into sections: runs of clauses with a
//! non-variable first argument are indexable, clauses with a variable
//! first argument stand alone (every clause applies). Sections chain
//! through `try_me_else`/`retry_me_else`/`trust_me`; inside an indexable
//! section a `switch_on_term` dispatches on the tag of A0 and per-value
//! tables reach clause chains built from `try`/`retry`/`trust`, which
//! share the clause code with the variable entry chain.

use std::sync::Arc;

use itertools::Itertools;
use tracing::debug;

use super::{clause_body, clause_head, compile_clause, conjunction_goals};
use crate::isa::{CodePtr, Instr, SwitchTable};
use crate::term::{Cell, CellView, Heap, DOTTED_PAIR};

/// First-argument class of a clause head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FirstArg {
    /// No first argument (arity 0) or a variable: not indexable.
    Any,
    /// Atomic constant; the cell is the key.
    Constant(Cell),
    /// List cell `./2`.
    List,
    /// Other structure; the functor cell is the key.
    Structure(Cell),
}

fn first_arg(heap: &Heap, clause: Cell) -> FirstArg {
    let head = clause_head(heap, clause);
    match head.view() {
        CellView::Str(_) if heap.check_functor(head) => {
            let arg = heap.deref(heap.arg(head, 0));
            match arg.view() {
                CellView::Ref(_) => FirstArg::Any,
                CellView::Con(_) | CellView::Int(_) => FirstArg::Constant(arg),
                CellView::Str(_) => {
                    let functor = heap.functor_of(arg);
                    if functor == DOTTED_PAIR {
                        FirstArg::List
                    } else {
                        FirstArg::Structure(functor)
                    }
                }
            }
        }
        _ => FirstArg::Any,
    }
}

/// Compile every clause of a predicate and chain them with indexing
/// dispatch. `base` is the code-area address the sequence will be
/// appended at; all emitted labels are absolute.
pub(crate) fn compile_predicate(heap: &Heap, clauses: &[Cell], base: usize) -> Vec<Instr> {
    let compiled: Vec<Vec<Instr>> = clauses
        .iter()
        .map(|&clause| {
            let head = clause_head(heap, clause);
            let goals = conjunction_goals(heap, clause_body(heap, clause));
            compile_clause(heap, head, &goals)
        })
        .collect();
    debug!(clauses = clauses.len(), base, "compiling predicate");

    if clauses.len() == 1 {
        return compiled.into_iter().next().expect("one clause");
    }

    let first_args: Vec<FirstArg> = clauses.iter().map(|&c| first_arg(heap, c)).collect();

    // Runs of indexable clauses form sections; an `Any` clause always
    // sits in a section of its own.
    let mut sections: Vec<Vec<usize>> = Vec::new();
    for (is_any, group) in &first_args
        .iter()
        .enumerate()
        .group_by(|(_, fa)| matches!(fa, FirstArg::Any))
    {
        if is_any {
            sections.extend(group.map(|(i, _)| vec![i]));
        } else {
            sections.push(group.map(|(i, _)| i).collect());
        }
    }

    let outer = sections.len() > 1;
    let mut out = Vec::new();

    // Pass one: size every section body so all labels are computable.
    let body_len = |cs: &[usize]| -> usize {
        if cs.len() == 1 {
            return compiled[cs[0]].len();
        }
        let k = cs.len();
        let clause_total: usize = cs.iter().map(|&c| compiled[c].len()).sum();
        let (con, list, strs) = classify(&first_args, cs);
        let con_switch = usize::from(!con.is_empty());
        let str_switch = usize::from(!strs.is_empty());
        let chain_total: usize = bucket_chains(&con)
            .chain(bucket_chains(&strs))
            .map(|b| b.len())
            .sum::<usize>()
            + if list.len() > 1 { list.len() } else { 0 };
        1 + k + con_switch + str_switch + chain_total + clause_total
    };

    let mut cursor = base;
    let mut section_entry = Vec::with_capacity(sections.len());
    for cs in &sections {
        section_entry.push(cursor);
        cursor += usize::from(outer) + body_len(cs);
    }

    // Pass two: emit.
    for (s, cs) in sections.iter().enumerate() {
        if outer {
            let instr = if s == 0 {
                Instr::TryMeElse {
                    alt: CodePtr(section_entry[s + 1]),
                }
            } else if s + 1 < sections.len() {
                Instr::RetryMeElse {
                    alt: CodePtr(section_entry[s + 1]),
                }
            } else {
                Instr::TrustMe
            };
            out.push(instr);
        }

        if cs.len() == 1 {
            out.extend(compiled[cs[0]].iter().cloned());
            continue;
        }

        emit_indexed_section(
            &mut out,
            &compiled,
            &first_args,
            cs,
            section_entry[s] + usize::from(outer),
        );
    }

    debug_assert_eq!(base + out.len(), cursor, "layout size mismatch");
    out
}

/// Constant, list and structure clause groups of a section, in source
/// order. Constant and structure groups are keyed buckets.
#[allow(clippy::type_complexity)]
fn classify(
    first_args: &[FirstArg],
    cs: &[usize],
) -> (Vec<(Cell, Vec<usize>)>, Vec<usize>, Vec<(Cell, Vec<usize>)>) {
    let mut con: Vec<(Cell, Vec<usize>)> = Vec::new();
    let mut list: Vec<usize> = Vec::new();
    let mut strs: Vec<(Cell, Vec<usize>)> = Vec::new();
    for &c in cs {
        match first_args[c] {
            FirstArg::Constant(key) => push_bucket(&mut con, key, c),
            FirstArg::List => list.push(c),
            FirstArg::Structure(key) => push_bucket(&mut strs, key, c),
            FirstArg::Any => unreachable!("indexable sections have no variable clauses"),
        }
    }
    (con, list, strs)
}

fn push_bucket(buckets: &mut Vec<(Cell, Vec<usize>)>, key: Cell, clause: usize) {
    match buckets.iter_mut().find(|(k, _)| *k == key) {
        Some((_, v)) => v.push(clause),
        None => buckets.push((key, vec![clause])),
    }
}

/// Buckets that need a `try`/`retry`/`trust` chain block.
fn bucket_chains<'a>(
    buckets: &'a [(Cell, Vec<usize>)],
) -> impl Iterator<Item = &'a Vec<usize>> + 'a {
    buckets.iter().map(|(_, v)| v).filter(|v| v.len() > 1)
}

fn emit_indexed_section(
    out: &mut Vec<Instr>,
    compiled: &[Vec<Instr>],
    first_args: &[FirstArg],
    cs: &[usize],
    body_start: usize,
) {
    let k = cs.len();
    let (con, list, strs) = classify(first_args, cs);

    // Internal layout, mirroring the size computation above.
    let mut p = body_start + 1;
    let var_chain_at = p;
    p += k;
    let con_switch_at = (!con.is_empty()).then(|| {
        let at = p;
        p += 1;
        at
    });
    let str_switch_at = (!strs.is_empty()).then(|| {
        let at = p;
        p += 1;
        at
    });
    let mut chain_at = Vec::new();
    for chain in bucket_chains(&con).chain(bucket_chains(&strs)) {
        chain_at.push((chain.clone(), p));
        p += chain.len();
    }
    let list_chain_at = (list.len() > 1).then(|| {
        let at = p;
        p += list.len();
        at
    });
    let mut clause_at = vec![0usize; compiled.len()];
    for &c in cs {
        clause_at[c] = p;
        p += compiled[c].len();
    }

    let chain_target = |chain: &[usize]| -> CodePtr {
        if chain.len() == 1 {
            CodePtr(clause_at[chain[0]])
        } else {
            let at = chain_at
                .iter()
                .find(|(b, _)| b == chain)
                .map(|&(_, at)| at)
                .or(list_chain_at)
                .expect("chain was laid out");
            CodePtr(at)
        }
    };

    // switch_on_term
    out.push(Instr::SwitchOnTerm {
        on_var: CodePtr(var_chain_at),
        on_con: con_switch_at.map(CodePtr),
        on_list: (!list.is_empty()).then(|| chain_target(&list)),
        on_str: str_switch_at.map(CodePtr),
    });

    // Variable entry: try every clause of the section in source order.
    emit_chain(out, cs, &clause_at);

    if con_switch_at.is_some() {
        let table = SwitchTable::from_pairs(
            con.iter()
                .map(|(key, chain)| (*key, chain_target(chain))),
        );
        out.push(Instr::SwitchOnConstant {
            table: Arc::new(table),
        });
    }
    if str_switch_at.is_some() {
        let table = SwitchTable::from_pairs(
            strs.iter()
                .map(|(key, chain)| (*key, chain_target(chain))),
        );
        out.push(Instr::SwitchOnStructure {
            table: Arc::new(table),
        });
    }

    for (chain, _) in &chain_at {
        emit_chain(out, chain, &clause_at);
    }
    if list_chain_at.is_some() {
        emit_chain(out, &list, &clause_at);
    }

    for &c in cs {
        out.extend(compiled[c].iter().cloned());
    }
}

/// `try`/`retry`/`trust` chain over clause entry points.
fn emit_chain(out: &mut Vec<Instr>, clauses: &[usize], clause_at: &[usize]) {
    let last = clauses.len() - 1;
    for (i, &c) in clauses.iter().enumerate() {
        let clause = CodePtr(clause_at[c]);
        let instr = if i == 0 {
            Instr::Try { clause }
        } else if i < last {
            Instr::Retry { clause }
        } else {
            Instr::Trust { clause }
        };
        out.push(instr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Reg;
    use crate::term::EMPTY_LIST;

    // member(X, [X|_]). member(X, [_|Xs]) :- member(X, Xs).
    fn member_clauses(heap: &mut Heap) -> (Cell, Vec<Cell>) {
        let member = heap.functor_cell("member", 2);
        let c1 = {
            let x = heap.new_ref();
            let tail = heap.new_ref();
            let cons = heap.new_str(DOTTED_PAIR, &[x, tail]);
            heap.new_str(member, &[x, cons])
        };
        let c2 = {
            let x = heap.new_ref();
            let skip = heap.new_ref();
            let xs = heap.new_ref();
            let cons = heap.new_str(DOTTED_PAIR, &[skip, xs]);
            let head = heap.new_str(member, &[x, cons]);
            let goal = heap.new_str(member, &[x, xs]);
            let imp = heap.functor_cell(":-", 2);
            heap.new_str(imp, &[head, goal])
        };
        (member, vec![c1, c2])
    }

    #[test]
    fn variable_first_arguments_chain_without_dispatch() {
        let mut heap = Heap::new();
        let (_, clauses) = member_clauses(&mut heap);
        let code = compile_predicate(&heap, &clauses, 10);

        // Both clauses have a variable first argument: two sections,
        // no switch anywhere.
        assert!(matches!(code[0], Instr::TryMeElse { .. }));
        assert!(!code
            .iter()
            .any(|i| matches!(i, Instr::SwitchOnTerm { .. })));
        let trust_at = code
            .iter()
            .position(|i| matches!(i, Instr::TrustMe))
            .expect("second section opens with trust_me");
        if let Instr::TryMeElse { alt } = code[0] {
            assert_eq!(alt, CodePtr(10 + trust_at));
        }
    }

    #[test]
    fn indexable_predicates_get_a_term_switch() {
        // append([], Zs, Zs). append([X|Xs], Ys, [X|Zs]) :- ...
        let mut heap = Heap::new();
        let append = heap.functor_cell("append", 3);
        let c1 = {
            let zs = heap.new_ref();
            heap.new_str(append, &[EMPTY_LIST, zs, zs])
        };
        let c2 = {
            let x = heap.new_ref();
            let xs = heap.new_ref();
            let ys = heap.new_ref();
            let zs = heap.new_ref();
            let cons1 = heap.new_str(DOTTED_PAIR, &[x, xs]);
            let cons2 = heap.new_str(DOTTED_PAIR, &[x, zs]);
            let head = heap.new_str(append, &[cons1, ys, cons2]);
            let goal = heap.new_str(append, &[xs, ys, zs]);
            let imp = heap.functor_cell(":-", 2);
            heap.new_str(imp, &[head, goal])
        };

        let code = compile_predicate(&heap, &[c1, c2], 0);

        // One section: no try_me_else prefix, switch first.
        let (on_var, on_con, on_list) = match code[0] {
            Instr::SwitchOnTerm {
                on_var,
                on_con,
                on_list,
                ..
            } => (on_var, on_con, on_list),
            ref other => panic!("expected switch_on_term, got {other:?}"),
        };
        assert_eq!(on_var, CodePtr(1));
        assert!(matches!(code[1], Instr::Try { .. }));
        assert!(matches!(code[2], Instr::Trust { .. }));

        // The constant entry dispatches on `[]` to the first clause.
        let con_switch = on_con.expect("has a constant clause");
        let table = match &code[con_switch.0] {
            Instr::SwitchOnConstant { table } => table,
            other => panic!("expected switch_on_constant, got {other:?}"),
        };
        let c1_entry = table.lookup(EMPTY_LIST).expect("[] is keyed");
        assert!(matches!(
            code[c1_entry.0],
            Instr::GetConstant { constant, a: 0 } if constant == EMPTY_LIST
        ));

        // The list entry jumps straight to the second clause, whose
        // head decodes the `./2` cell in A0.
        let c2_entry = on_list.expect("has a list clause");
        assert!(matches!(code[c2_entry.0], Instr::GetVariableX { a: 1, .. }));
        assert!(matches!(
            code[c2_entry.0 + 1],
            Instr::GetStructure {
                functor,
                reg: Reg::A(0)
            } if functor == DOTTED_PAIR
        ));
    }

    #[test]
    fn repeated_constant_keys_share_a_chain() {
        // p(a). p(b). p(a).
        let mut heap = Heap::new();
        let p = heap.functor_cell("p", 1);
        let a = heap.atom("a");
        let b = heap.atom("b");
        let c1 = heap.new_str(p, &[a]);
        let c2 = heap.new_str(p, &[b]);
        let c3 = heap.new_str(p, &[a]);

        let code = compile_predicate(&heap, &[c1, c2, c3], 0);
        let table = code
            .iter()
            .find_map(|i| match i {
                Instr::SwitchOnConstant { table } => Some(table),
                _ => None,
            })
            .expect("constant switch emitted");

        // `a` reaches a try/trust chain over clauses 1 and 3; `b` jumps
        // directly to its clause.
        let a_entry = table.lookup(a).expect("a keyed");
        assert!(matches!(code[a_entry.0], Instr::Try { .. }));
        assert!(matches!(code[a_entry.0 + 1], Instr::Trust { .. }));
        let b_entry = table.lookup(b).expect("b keyed");
        assert!(matches!(
            code[b_entry.0],
            Instr::GetConstant { constant, a: 0 } if constant == b
        ));
    }
}
