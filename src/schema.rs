// Run ledger tables, kept in sync with repository/schema_sqlite.sql.

diesel::table! {
    dag_runs (id) {
        id -> Integer,
        dag_id -> Text,
        logical_date -> Text,
        status -> Text,
        started_at -> Text,
        finished_at -> Nullable<Text>,
        error -> Nullable<Text>,
    }
}

diesel::table! {
    task_runs (id) {
        id -> Integer,
        dag_run_id -> Integer,
        task_id -> Text,
        attempt -> Integer,
        status -> Text,
        started_at -> Text,
        finished_at -> Nullable<Text>,
        response -> Nullable<Text>,
        error -> Nullable<Text>,
    }
}

diesel::joinable!(task_runs -> dag_runs (dag_run_id));

diesel::allow_tables_to_appear_in_same_query!(dag_runs, task_runs);
