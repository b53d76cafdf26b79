pub mod file {
    use state_machines::state_machine;

    state_machine! {
        name: FileMachine,
        state: FileState,
        initial: Discovered,
        states: [Discovered, Normalized, Materialized, Identified, StoredAndLinked, DiscardedAndLinked, SourceRemoved],
        events {
            normalize { transition: { from: Discovered, to: Normalized } }
            materialize { transition: { from: Normalized, to: Materialized } }
            identify { transition: { from: Materialized, to: Identified } }
            store { transition: { from: Identified, to: StoredAndLinked } }
            discard { transition: { from: Identified, to: DiscardedAndLinked } }
            remove_source {
                transition: { from: StoredAndLinked, to: SourceRemoved }
                transition: { from: DiscardedAndLinked, to: SourceRemoved }
            }
        }
    }

    pub fn discovered() -> FileMachine<(), Discovered> {
        FileMachine::new(())
    }
}

pub mod directory {
    use state_machines::state_machine;

    state_machine! {
        name: DirectoryMachine,
        state: DirectoryState,
        initial: Discovered,
        states: [Discovered, Normalized, Identified, Linked, Recursed],
        events {
            normalize { transition: { from: Discovered, to: Normalized } }
            identify { transition: { from: Normalized, to: Identified } }
            link { transition: { from: Identified, to: Linked } }
            recurse { transition: { from: Linked, to: Recursed } }
        }
    }

    pub fn discovered() -> DirectoryMachine<(), Discovered> {
        DirectoryMachine::new(())
    }
}
