//! Per-block splitting
//!
//! Rather than cutting once at a single block boundary, every block with uses
//! gets its own new range from its first to its last use. The value crosses
//! block boundaries in whatever is left over, which becomes one more range.

use super::analysis::SplitAnalysis;
use super::editor::SplitEditor;
use crate::live::clip;
use crate::session::AllocSession;
use ra_common::{Segment, Stage, VirtReg};

pub(crate) fn try_block_split(session: &mut AllocSession<'_>, vreg: VirtReg, sa: &SplitAnalysis) -> Vec<VirtReg> {
    if sa.blocks.len() < 2 {
        return Vec::new();
    }
    let mut editor = SplitEditor::new(vreg);
    for b in sa.use_blocks() {
        let (Some(first), Some(last)) = (b.first_use(), b.last_use()) else {
            continue;
        };
        let piece = editor.open_interval(None);
        editor.add(piece, clip(&b.live, &Segment::new(first, last + 1)));
    }
    editor.finish(session, Stage::Split2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AllocConfig;
    use crate::function::{Block, Function, UseSlot, VRegDesc};
    use crate::target::TargetInfo;
    use pretty_assertions::assert_eq;
    use ra_common::RegClassId;

    #[test]
    fn test_one_piece_per_use_block() {
        let mut func = Function::new("blk");
        func.blocks = vec![Block::new(0, 10, 1.0), Block::new(10, 20, 1.0), Block::new(20, 30, 1.0)];
        func.vregs.push(VRegDesc {
            id: VirtReg::new(0),
            class: RegClassId(0),
            segments: vec![Segment::new(2, 28)],
            uses: vec![UseSlot::def(2), UseSlot::read(5), UseSlot::read(26)],
            hints: Vec::new(),
        });
        let target = TargetInfo::uniform(1);
        let config = AllocConfig::default();
        let mut session = AllocSession::new(&func, &target, &config).unwrap();
        let sa = SplitAnalysis::new(session.lis.get(VirtReg::new(0)).unwrap(), &session.lis);

        let new = try_block_split(&mut session, VirtReg::new(0), &sa);
        assert_eq!(new.len(), 3);
        let segments: Vec<Vec<Segment>> = new.iter().map(|v| session.lis.get(*v).unwrap().segments.clone()).collect();
        assert_eq!(
            segments,
            vec![
                vec![Segment::new(2, 6)],
                vec![Segment::new(26, 27)],
                vec![Segment::new(6, 26), Segment::new(27, 28)],
            ]
        );
        // The connecting piece carries no uses and will be dropped when dequeued
        assert!(session.lis.get(new[2]).unwrap().is_unused());
    }
}
