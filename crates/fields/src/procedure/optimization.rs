use super::{Instruction, Procedure, VarId};
use crate::hash::HashMap;
use std::mem;

/// Moves every destruct instruction directly behind the last instruction
/// that used the variable before it, so buffers are released as early as
/// possible. Destructs of variables that are never used are moved to the
/// start of the procedure.
///
/// The relative order of calls is unchanged.
#[tracing::instrument(skip_all)]
pub fn move_destructs_up(procedure: &mut Procedure) {
    let instructions = mem::take(procedure.instructions_mut());

    // `destructs[0]` run before the first remaining instruction,
    // `destructs[i + 1]` directly after instruction `i`
    let mut remaining: Vec<Instruction> = Vec::with_capacity(instructions.len());
    let mut destructs: Vec<Vec<VarId>> = vec![Vec::new()];
    // Slot in `destructs` behind the last remaining instruction using a var
    let mut last_use: HashMap<VarId, usize> = HashMap::default();
    let mut moved = 0;

    for instruction in instructions {
        match instruction {
            Instruction::Destruct(var) => {
                let slot = last_use.get(&var).copied().unwrap_or(0);
                if slot + 1 != destructs.len() {
                    moved += 1;
                }
                destructs[slot].push(var);
            }
            other => {
                if let Instruction::Call(call) = &other {
                    for var in call.params().iter().flatten() {
                        last_use.insert(*var, remaining.len() + 1);
                    }
                }
                remaining.push(other);
                destructs.push(Vec::new());
            }
        }
    }

    let output = procedure.instructions_mut();
    for (slot, instruction) in destructs.into_iter().zip(
        std::iter::once(None).chain(remaining.into_iter().map(Some)),
    ) {
        output.extend(instruction);
        output.extend(slot.into_iter().map(Instruction::Destruct));
    }

    tracing::trace!(moved, "moved destruct instructions");
}
