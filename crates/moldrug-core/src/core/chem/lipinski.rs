use super::Descriptors;

pub const DEFAULT_MAX_VIOLATIONS: usize = 2;

const MAX_H_ACCEPTORS: u32 = 10;
const MAX_H_DONORS: u32 = 5;
const MAX_MOL_WT: f64 = 500.0;
const MAX_LOGP: f64 = 5.0;
const MAX_ROTATABLE_BONDS: u32 = 10;
const MAX_TPSA: f64 = 140.0;

/// Number of exceeded Lipinski/Veber cutoffs.
pub fn lipinski_violations(d: &Descriptors) -> usize {
    [
        d.num_h_acceptors > MAX_H_ACCEPTORS,
        d.num_h_donors > MAX_H_DONORS,
        d.mol_wt > MAX_MOL_WT,
        d.logp > MAX_LOGP,
        d.num_rotatable_bonds > MAX_ROTATABLE_BONDS,
        d.tpsa > MAX_TPSA,
    ]
    .into_iter()
    .filter(|&violated| violated)
    .count()
}

/// `false` once the number of violations reaches `max_violations`.
pub fn lipinski_filter(d: &Descriptors, max_violations: usize) -> bool {
    lipinski_violations(d) < max_violations
}
