// Display filter - decides whether an individual test line is rendered

use crate::config::ShowFilter;
use crate::state::TestStatus;

/// Stateless gate for individual test and subtest lines. Package summaries and
/// the final statistics block are never passed through here.
pub fn should_show(filter: ShowFilter, status: TestStatus) -> bool {
    match filter {
        ShowFilter::All => true,
        ShowFilter::Failed | ShowFilter::Collapsed => status == TestStatus::Fail,
        ShowFilter::Passed => status == TestStatus::Pass,
        ShowFilter::Skipped => status == TestStatus::Skip,
        ShowFilter::None => false,
    }
}
