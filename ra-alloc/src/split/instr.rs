//! Splitting around single instructions

use super::editor::SplitEditor;
use crate::session::AllocSession;
use ra_common::{AllocError, Segment, Stage, VirtReg};

/// One new range per use slot plus the remainder. Products go straight to
/// `Spill`, so this never repeats on its own output.
pub(crate) fn try_instruction_split(session: &mut AllocSession<'_>, vreg: VirtReg) -> Result<Vec<VirtReg>, AllocError> {
    let li = session.interval(vreg)?;
    let slots = li.use_slots();
    if slots.is_empty() || li.size() as usize <= slots.len() {
        return Ok(Vec::new());
    }
    let mut editor = SplitEditor::new(vreg);
    for slot in slots {
        let piece = editor.open_interval(None);
        editor.add(piece, [Segment::new(slot, slot + 1)]);
    }
    Ok(editor.finish(session, Stage::Spill))
}
