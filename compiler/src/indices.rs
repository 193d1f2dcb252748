// indices.rs — Mixed-radix arithmetic over replicator index tuples.
//
// A replicator with indices of extents d_1..d_k describes a block of
// Π d_j processes. Placement and channel expansion both need to map an
// index tuple to its position in that block and back. The position of
// (i_1,..,i_k) is Σ (i_j - base_j) · Π_{m>j} d_m: zero-based, last
// index fastest, so position and tuple round-trip exactly.
//
// Every function here requires the index bounds to have been folded
// (base_value/count_value present); placement checking guarantees that
// before any of this runs, and a missing bound is an internal bug.

use crate::ast::{BinOp, Elem, Expr, RepIndex};

fn count_of(ix: &RepIndex) -> i64 {
    ix.count_value
        .expect("replicator bound folded before index arithmetic")
}

fn base_of(ix: &RepIndex) -> i64 {
    ix.base_value
        .expect("replicator base folded before index arithmetic")
}

/// Total number of processes described by the indices: Π d_j.
pub fn extent_product(indices: &[RepIndex]) -> i64 {
    indices.iter().map(count_of).product()
}

/// Position of a concrete index tuple within its block.
pub fn indices_value(indices: &[RepIndex], values: &[i64]) -> i64 {
    assert_eq!(indices.len(), values.len());
    let mut mult = extent_product(indices);
    let mut r = 0;
    for (ix, v) in indices.iter().zip(values) {
        mult /= count_of(ix);
        r += (v - base_of(ix)) * mult;
    }
    r
}

/// Index tuple at a given position. Inverse of [`indices_value`].
pub fn decode_value(indices: &[RepIndex], position: i64) -> Vec<i64> {
    let mut divisor = extent_product(indices);
    indices
        .iter()
        .map(|ix| {
            divisor /= count_of(ix);
            base_of(ix) + (position / divisor).rem_euclid(count_of(ix))
        })
        .collect()
}

/// All raw index tuples of the block, in position order: the tuple at
/// offset p is exactly `decode_value(indices, p)`.
pub fn index_tuples(indices: &[RepIndex]) -> Vec<Vec<i64>> {
    let total = extent_product(indices);
    (0..total).map(|p| decode_value(indices, p)).collect()
}

/// Expression computing the position from the live index variables,
/// for attaching to a replicator body's location.
///
/// Shape: `(i - b) * c` per index (with the subtraction and the factor
/// omitted where they are identities), summed left to right with the
/// accumulated prefix grouped.
pub fn indices_expr(indices: &[RepIndex]) -> Option<Expr> {
    let mut result: Option<Expr> = None;
    let mut mult = extent_product(indices);
    for ix in indices {
        mult /= count_of(ix);
        let pos = if base_of(ix) == 0 {
            Expr::id(ix.name.clone(), ix.sym)
        } else {
            Expr::binop(
                BinOp::Sub,
                Elem::id(ix.name.clone(), ix.sym),
                Expr::num(base_of(ix)),
            )
        };
        let term = if mult > 1 {
            let lhs = match pos {
                Expr::Single(elem) => elem,
                other => other.group(),
            };
            Expr::binop(BinOp::Mul, lhs, Expr::num(mult))
        } else {
            pos
        };
        result = Some(match result {
            None => term,
            Some(prev) => Expr::binop(BinOp::Add, prev.group(), term),
        });
    }
    result
}

/// Per-index expressions recovering the raw index values from a
/// position expression `t`: `base + ((t / divisor) rem d)`.
///
/// Replicator distribution substitutes these for the index variables in
/// the distributed call.
pub fn decode_exprs(indices: &[RepIndex], t: &Elem) -> Vec<Expr> {
    let mut divisor = extent_product(indices);
    indices
        .iter()
        .map(|ix| {
            divisor /= count_of(ix);
            let mut e = Expr::binop(
                BinOp::Rem,
                Expr::binop(BinOp::Div, t.clone(), Expr::num(divisor)).group(),
                Expr::num(count_of(ix)),
            );
            if base_of(ix) != 0 {
                e = Expr::binop(BinOp::Add, Elem::num(base_of(ix)), Expr::Single(e.group()));
            }
            e
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::SymId;
    use crate::printer::expr_text;

    fn ix(name: &str, base: i64, count: i64) -> RepIndex {
        let mut r = RepIndex::new(name, SymId(0), Expr::num(base), Expr::num(count));
        r.base_value = Some(base);
        r.count_value = Some(count);
        r
    }

    #[test]
    fn position_of_tuple() {
        let indices = [ix("i", 0, 2), ix("j", 0, 3)];
        assert_eq!(indices_value(&indices, &[1, 2]), 5);
        assert_eq!(indices_value(&indices, &[0, 0]), 0);
        assert_eq!(extent_product(&indices), 6);
    }

    #[test]
    fn positions_round_trip() {
        let indices = [ix("i", 0, 2), ix("j", 1, 3), ix("k", 0, 4)];
        for p in 0..extent_product(&indices) {
            let tuple = decode_value(&indices, p);
            assert_eq!(indices_value(&indices, &tuple), p);
        }
    }

    #[test]
    fn tuple_enumeration_order() {
        let indices = [ix("i", 1, 2), ix("j", 0, 2)];
        let tuples = index_tuples(&indices);
        assert_eq!(tuples, vec![vec![1, 0], vec![1, 1], vec![2, 0], vec![2, 1]]);
    }

    #[test]
    fn symbolic_encode_shape() {
        let indices = [ix("i", 0, 2), ix("j", 0, 3)];
        let e = indices_expr(&indices).unwrap();
        assert_eq!(expr_text(&e), "(i * 3) + j");

        let one = [ix("i", 0, 4)];
        let e = indices_expr(&one).unwrap();
        assert_eq!(expr_text(&e), "i");

        let based = [ix("i", 2, 4)];
        let e = indices_expr(&based).unwrap();
        assert_eq!(expr_text(&e), "i - 2");
    }

    #[test]
    fn symbolic_decode_shape() {
        let indices = [ix("i", 0, 2), ix("j", 0, 3)];
        let t = Elem::id("_t", SymId(1));
        let es = decode_exprs(&indices, &t);
        assert_eq!(es.len(), 2);
        assert_eq!(expr_text(&es[0]), "(_t / 3) rem 2");
        assert_eq!(expr_text(&es[1]), "(_t / 1) rem 3");
    }
}
