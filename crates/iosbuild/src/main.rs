fn main() -> anyhow::Result<()> {
    iosbuild::run()
}
