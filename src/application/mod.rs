pub mod background;
pub mod bootstrap;
pub mod commands;
pub mod notification_scheduler;
pub mod prayer_times;
pub mod tick_loop;
