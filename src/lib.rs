pub mod ebi_framework {
    pub mod activity_key;
    pub mod displayable;
    pub mod ebi_command;
    pub mod ebi_input;
    pub mod ebi_output;
    pub mod exportable;
    pub mod importable;
    pub mod infoable;
    pub mod simulation_config;
}
pub mod ebi_commands {
    pub mod ebi_command_estimate;
    pub mod ebi_command_info;
    pub mod ebi_command_replay;
    pub mod ebi_command_simulate;
}
pub mod ebi_objects {
    pub mod event_log;
    pub mod labelled_petri_net;
    pub mod stochastic_parameters;
}
pub mod math {
    pub mod delay_model;
    pub mod special_functions;
}
pub mod semantics {
    pub mod labelled_petri_net_semantics;
    pub mod semantics;
}
pub mod techniques {
    pub mod distribution_fitting;
    pub mod parameter_estimation;
    pub mod predecessors;
    pub mod simulation;
    pub mod token_game;
    pub mod token_replay;
}
pub mod line_reader;
pub mod marking;
