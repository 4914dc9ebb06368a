pub mod health;
pub mod prerender;
