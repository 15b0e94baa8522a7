/// Counters for one watch run.
#[derive(Debug, Default)]
pub struct WatchStats {
    pub events_seen: u64,
    pub events_accepted: u64,
    pub candidates_loaded: u64,
    pub load_failures: u64,
    pub too_small: u64,
    pub reverted: u64,
    pub dispatched: u64,
    pub submit_failures: u64,
    pub jobs_failed: u64,
    pub batches_reported: u64,
    pub entries_written: u64,
    pub report_conflicts: u64,
}

impl std::fmt::Display for WatchStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Watch Run Complete ===")?;
        writeln!(f, "Events seen:        {}", self.events_seen)?;
        writeln!(f, "Events accepted:    {}", self.events_accepted)?;
        writeln!(f, "Candidates loaded:  {}", self.candidates_loaded)?;
        writeln!(f, "Load failures:      {}", self.load_failures)?;
        writeln!(f, "Too small/noisy:    {}", self.too_small)?;
        writeln!(f, "Reverted:           {}", self.reverted)?;
        writeln!(f, "Dispatched:         {}", self.dispatched)?;
        writeln!(f, "Submit failures:    {}", self.submit_failures)?;
        writeln!(f, "Jobs failed:        {}", self.jobs_failed)?;
        writeln!(f, "Batches reported:   {}", self.batches_reported)?;
        writeln!(f, "Entries written:    {}", self.entries_written)?;
        writeln!(f, "Report conflicts:   {}", self.report_conflicts)?;
        Ok(())
    }
}
