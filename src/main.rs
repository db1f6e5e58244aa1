use sockme::error::AppResult;

fn main() -> AppResult<()> {
    sockme::entry::run()
}
