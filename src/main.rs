fn main() -> anyhow::Result<()> {
    meetwatch_lib::run()
}
