fn main() -> anyhow::Result<()> {
    parkwatch_lib::run()
}
