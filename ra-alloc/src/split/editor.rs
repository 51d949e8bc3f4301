//! Carving a live range into new ranges

use crate::live::{clip, normalize, subtract, LiveInterval};
use crate::session::AllocSession;
use log::debug;
use ra_common::{PhysReg, Segment, Stage, VirtReg};

#[derive(Debug, Default)]
struct Piece {
    segments: Vec<Segment>,
    hint: Option<PhysReg>,
}

/// Collects the pieces a range is split into. Whatever no piece claims
/// becomes one more range when the split is applied.
#[derive(Debug)]
pub struct SplitEditor {
    parent: VirtReg,
    pieces: Vec<Piece>,
}

impl SplitEditor {
    pub fn new(parent: VirtReg) -> Self {
        Self {
            parent,
            pieces: Vec::new(),
        }
    }

    /// Start a new piece, optionally preferring `hint`
    pub fn open_interval(&mut self, hint: Option<PhysReg>) -> usize {
        self.pieces.push(Piece {
            segments: Vec::new(),
            hint,
        });
        self.pieces.len() - 1
    }

    pub fn add(&mut self, piece: usize, segments: impl IntoIterator<Item = Segment>) {
        if let Some(p) = self.pieces.get_mut(piece) {
            p.segments.extend(segments);
        }
    }

    /// Segments of each piece, earlier pieces winning overlaps, plus the
    /// unclaimed remainder of `parent`
    fn partition(&self, parent: &LiveInterval) -> Vec<(Vec<Segment>, Option<PhysReg>)> {
        let mut claimed: Vec<Segment> = Vec::new();
        let mut out = Vec::new();
        for piece in &self.pieces {
            let mut own: Vec<Segment> = piece
                .segments
                .iter()
                .flat_map(|s| clip(&parent.segments, s))
                .collect();
            normalize(&mut own);
            let own = subtract(&own, &claimed);
            claimed.extend(own.iter().copied());
            normalize(&mut claimed);
            out.push((own, piece.hint));
        }
        out.push((subtract(&parent.segments, &claimed), None));
        out.retain(|(segs, _)| !segs.is_empty());
        out
    }

    /// Replace the parent by the pieces. Returns nothing, and changes
    /// nothing, when fewer than two non-empty pieces result.
    pub fn finish(self, session: &mut AllocSession<'_>, stage: Stage) -> Vec<VirtReg> {
        let Some(parent) = session.lis.get(self.parent).cloned() else {
            return Vec::new();
        };
        let parts = self.partition(&parent);
        if parts.len() < 2 {
            return Vec::new();
        }

        let mut created = Vec::with_capacity(parts.len());
        for (segments, hint) in parts {
            let uses = parent
                .uses
                .iter()
                .filter(|u| segments.iter().any(|s| s.contains(u.slot)))
                .copied()
                .collect();
            let vreg = session.lis.create_derived(&parent, segments, uses, parent.spillable);
            if let Some(preg) = hint {
                session.lis.prefer(vreg, preg);
            }
            created.push(vreg);
        }
        debug!("split {} into {:?} at stage {}", parent.reg, created, stage);
        session.retire_split(parent.reg, &created, stage);
        created
    }
}
