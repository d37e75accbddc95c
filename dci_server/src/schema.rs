//! Diesel table definitions for the scheduling engine.
//!
//! Tables: topics, topics_teams, components, remotecis, rconfigurations,
//! remotecis_rconfigurations, jobs, jobs_components, jobstates,
//! jobs_events, sequences, counters, files.

diesel::table! {
    topics (id) {
        id -> Uuid,
        name -> Varchar,
        product_id -> Nullable<Uuid>,
        component_types -> Array<Text>,
        optional_component_types -> Array<Text>,
        export_control -> Bool,
        next_topic_id -> Nullable<Uuid>,
        state -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    topics_teams (topic_id, team_id) {
        topic_id -> Uuid,
        team_id -> Uuid,
    }
}

diesel::table! {
    components (id) {
        id -> Uuid,
        topic_id -> Uuid,
        #[sql_name = "type"]
        type_ -> Varchar,
        name -> Varchar,
        export_control -> Bool,
        team_id -> Nullable<Uuid>,
        state -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    remotecis (id) {
        id -> Uuid,
        name -> Varchar,
        team_id -> Uuid,
        state -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    rconfigurations (id) {
        id -> Uuid,
        topic_id -> Uuid,
        name -> Varchar,
        component_types -> Nullable<Array<Text>>,
        state -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    remotecis_rconfigurations (remoteci_id, rconfiguration_id) {
        remoteci_id -> Uuid,
        rconfiguration_id -> Uuid,
    }
}

diesel::table! {
    jobs (id) {
        id -> Uuid,
        remoteci_id -> Uuid,
        team_id -> Uuid,
        topic_id -> Uuid,
        product_id -> Nullable<Uuid>,
        rconfiguration_id -> Nullable<Uuid>,
        previous_job_id -> Nullable<Uuid>,
        status -> Varchar,
        comment -> Nullable<Text>,
        duration -> Int4,
        etag -> Uuid,
        state -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    jobs_components (job_id, component_id) {
        job_id -> Uuid,
        component_id -> Uuid,
        position -> Int4,
    }
}

diesel::table! {
    jobstates (id) {
        id -> Uuid,
        job_id -> Uuid,
        team_id -> Uuid,
        status -> Varchar,
        comment -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    jobs_events (id) {
        id -> Int8,
        job_id -> Uuid,
        topic_id -> Uuid,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    sequences (name) {
        name -> Varchar,
        value -> Int8,
    }
}

diesel::table! {
    counters (name) {
        name -> Varchar,
        sequence -> Int8,
        etag -> Uuid,
    }
}

diesel::table! {
    files (id) {
        id -> Uuid,
        job_id -> Uuid,
        name -> Varchar,
        mime -> Nullable<Varchar>,
        size -> Nullable<Int8>,
        state -> Varchar,
        created_at -> Timestamptz,
    }
}

// Foreign key relationships
diesel::joinable!(topics_teams -> topics (topic_id));
diesel::joinable!(components -> topics (topic_id));
diesel::joinable!(rconfigurations -> topics (topic_id));
diesel::joinable!(remotecis_rconfigurations -> remotecis (remoteci_id));
diesel::joinable!(remotecis_rconfigurations -> rconfigurations (rconfiguration_id));
diesel::joinable!(jobs -> remotecis (remoteci_id));
diesel::joinable!(jobs -> topics (topic_id));
diesel::joinable!(jobs_components -> jobs (job_id));
diesel::joinable!(jobs_components -> components (component_id));
diesel::joinable!(jobstates -> jobs (job_id));
diesel::joinable!(jobs_events -> jobs (job_id));
diesel::joinable!(files -> jobs (job_id));

diesel::allow_tables_to_appear_in_same_query!(
    topics,
    topics_teams,
    components,
    remotecis,
    rconfigurations,
    remotecis_rconfigurations,
    jobs,
    jobs_components,
    jobstates,
    jobs_events,
    sequences,
    counters,
    files,
);
