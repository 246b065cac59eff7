pub mod outbox;
pub mod supabase;
