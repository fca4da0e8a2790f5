use crate::ObjectType;

/// Build-time limits of an OSAL instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub max_tasks: usize,
    pub max_queues: usize,
    pub max_count_semaphores: usize,
    pub max_bin_semaphores: usize,
    pub max_mutexes: usize,
    pub max_condvars: usize,
    pub max_timebases: usize,
    /// The largest priority value the portable layer hands out. Task
    /// priorities are remapped from `0..=max_task_priority` onto the kernel's
    /// eight levels.
    pub max_task_priority: u32,
    /// The stack size of the helper threads of a timebase.
    pub timebase_stack_size: usize,
}

impl Config {
    pub const DEFAULT: Self = Self {
        max_tasks: 64,
        max_queues: 64,
        max_count_semaphores: 20,
        max_bin_semaphores: 20,
        max_mutexes: 20,
        max_condvars: 4,
        max_timebases: 5,
        max_task_priority: 255,
        timebase_stack_size: 4096,
    };

    /// Get the number of slots in the table of the specified category.
    pub const fn capacity(&self, obj_type: ObjectType) -> usize {
        match obj_type {
            ObjectType::Task => self.max_tasks,
            ObjectType::Queue => self.max_queues,
            ObjectType::CountSem => self.max_count_semaphores,
            ObjectType::BinSem => self.max_bin_semaphores,
            ObjectType::Mutex => self.max_mutexes,
            ObjectType::TimeBase => self.max_timebases,
            ObjectType::CondVar => self.max_condvars,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}
