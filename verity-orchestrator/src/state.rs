use state_machines::state_machine;

state_machine! {
    name: ResearchRunMachine,
    state: ResearchRunState,
    initial: Ready,
    states: [Ready, Planned, Searched, Read, Ranked, Answered, Verified, Done, Failed],
    events {
        plan { transition: { from: Ready, to: Planned } }
        search { transition: { from: Planned, to: Searched } }
        read { transition: { from: Searched, to: Read } }
        rank { transition: { from: Read, to: Ranked } }
        answer { transition: { from: Ranked, to: Answered } }
        verify { transition: { from: Answered, to: Verified } }
        finish { transition: { from: Verified, to: Done } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: Planned, to: Failed }
            transition: { from: Searched, to: Failed }
            transition: { from: Read, to: Failed }
            transition: { from: Ranked, to: Failed }
            transition: { from: Answered, to: Failed }
            transition: { from: Verified, to: Failed }
        }
    }
}

pub fn ready() -> ResearchRunMachine<(), Ready> {
    ResearchRunMachine::new(())
}
