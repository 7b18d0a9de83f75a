mod repository;

pub use repository::WorkoutRepository;
