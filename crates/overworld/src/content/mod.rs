mod discovery;
mod hashing;
mod schema;
mod story;

pub use story::{load_story, SpawnPoint, Story, StoryLoadError, StoryWorld};
